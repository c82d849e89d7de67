//! Workload definition and parsing
//!
//! A workload is the platform-agnostic description of a deployable unit:
//! containers, the files and volumes they mount, the network ports they
//! expose and the resources they depend on. Field names follow the Score
//! workload format (`camelCase`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::resource::ResourceSpec;

fn default_api_version() -> String {
    "score.dev/v1b1".to_string()
}

/// A workload - the unit converted into a set of manifests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// API version (score.dev/v1b1)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Workload metadata, `name` is required
    pub metadata: WorkloadMetadata,

    /// Containers keyed by name, in declaration order
    #[serde(default)]
    pub containers: IndexMap<String, ContainerSpec>,

    /// Network service exposed by the workload
    #[serde(default)]
    pub service: Option<ServiceSpec>,

    /// Resources the workload depends on, keyed by name
    #[serde(default)]
    pub resources: IndexMap<String, ResourceSpec>,
}

impl Workload {
    /// Create an empty workload with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            metadata: WorkloadMetadata::with_name(name),
            containers: IndexMap::new(),
            service: None,
            resources: IndexMap::new(),
        }
    }

    /// Parse a workload from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let workload: Workload = serde_yaml::from_str(yaml)?;
        workload.validate()?;
        Ok(workload)
    }

    /// Parse a workload from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let workload: Workload = serde_json::from_str(json)?;
        workload.validate()?;
        Ok(workload)
    }

    /// Name of the workload (`metadata.name`)
    pub fn name(&self) -> Option<&str> {
        self.metadata.name()
    }

    fn validate(&self) -> Result<()> {
        if self.name().is_none_or(str::is_empty) {
            return Err(CoreError::MissingField {
                field: "metadata.name".to_string(),
            });
        }
        Ok(())
    }

    /// Add a container
    pub fn with_container(mut self, name: impl Into<String>, container: ContainerSpec) -> Self {
        self.containers.insert(name.into(), container);
        self
    }

    /// Declare a resource
    pub fn with_resource(mut self, name: impl Into<String>, resource: ResourceSpec) -> Self {
        self.resources.insert(name.into(), resource);
        self
    }
}

/// Free-form workload metadata
///
/// Any nested structure is allowed; the well-known keys are `name` and
/// `annotations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadMetadata(pub serde_json::Map<String, JsonValue>);

impl WorkloadMetadata {
    /// Metadata holding only a name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut map = serde_json::Map::new();
        map.insert("name".to_string(), JsonValue::String(name.into()));
        Self(map)
    }

    /// The `name` entry, if it is a string
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(JsonValue::as_str)
    }

    /// Look up an entry under `annotations`
    ///
    /// Returns the raw value so callers can reject non-string annotations.
    pub fn annotation(&self, key: &str) -> Option<&JsonValue> {
        self.0
            .get("annotations")
            .and_then(JsonValue::as_object)
            .and_then(|annotations| annotations.get(key))
    }

    /// Set an annotation, creating the `annotations` object if needed
    pub fn set_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let annotations = self
            .0
            .entry("annotations")
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
        if !annotations.is_object() {
            *annotations = JsonValue::Object(serde_json::Map::new());
        }
        if let JsonValue::Object(map) = annotations {
            map.insert(key.into(), JsonValue::String(value.into()));
        }
    }

    /// Walk nested metadata objects along `path`
    pub fn lookup(&self, path: &[String]) -> Option<&JsonValue> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

/// A single container of the workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Image reference
    pub image: String,

    /// Entrypoint override
    #[serde(default)]
    pub command: Vec<String>,

    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables, values may contain `${...}` references
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// CPU/memory requests and limits
    #[serde(default)]
    pub resources: Option<ContainerResources>,

    /// Volume mounts, in declaration order
    #[serde(default)]
    pub volumes: Vec<VolumeMountSpec>,

    /// Inline files, in declaration order
    #[serde(default)]
    pub files: Vec<FileSpec>,

    #[serde(default)]
    pub liveness_probe: Option<Probe>,

    #[serde(default)]
    pub readiness_probe: Option<Probe>,
}

impl ContainerSpec {
    /// Create a container running `image`
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Add an environment variable
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Add a volume mount
    pub fn with_volume(mut self, volume: VolumeMountSpec) -> Self {
        self.volumes.push(volume);
        self
    }

    /// Add an inline file
    pub fn with_file(mut self, file: FileSpec) -> Self {
        self.files.push(file);
        self
    }
}

/// Compute requests and limits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerResources {
    #[serde(default)]
    pub limits: Option<ResourceLimits>,

    #[serde(default)]
    pub requests: Option<ResourceLimits>,
}

/// CPU and memory quantities (e.g. `250m`, `512Mi`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub cpu: Option<String>,

    #[serde(default)]
    pub memory: Option<String>,
}

/// Volume mount descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMountSpec {
    /// Volume source: `${resources.<name>}` or a literal absolute host path
    pub source: String,

    /// Mount path inside the container
    pub target: String,

    /// Sub-path (or key) within the volume
    #[serde(default)]
    pub path: Option<String>,

    /// Mount read-only
    #[serde(default)]
    pub read_only: Option<bool>,

    /// Request a per-replica persistent claim instead of a shared volume
    #[serde(default)]
    pub claim: Option<ClaimRequest>,
}

impl VolumeMountSpec {
    /// Mount `source` at `target`
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    /// Set the sub-path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Request a persistent claim of the given size
    pub fn with_claim(mut self, size: impl Into<String>) -> Self {
        self.claim = Some(ClaimRequest {
            size: size.into(),
            storage_class: None,
            access_modes: Vec::new(),
        });
        self
    }
}

/// Persistent claim sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    /// Requested storage (e.g. `10Gi`)
    pub size: String,

    #[serde(default)]
    pub storage_class: Option<String>,

    /// Access modes, `ReadWriteOnce` when empty
    #[serde(default)]
    pub access_modes: Vec<String>,
}

/// Inline file mounted into a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    /// Absolute path of the file inside the container
    pub target: String,

    /// Octal permission string (e.g. `0644`)
    #[serde(default)]
    pub mode: Option<String>,

    /// Text content, `${...}` references are expanded unless `no_expand` is set
    #[serde(default)]
    pub content: Option<String>,

    /// Base64 encoded binary content, never expanded
    #[serde(default)]
    pub binary_content: Option<String>,

    #[serde(default)]
    pub no_expand: bool,
}

impl FileSpec {
    /// Text file at `target`
    pub fn new(target: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Health probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub http_get: HttpProbe,
}

/// HTTP GET health check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProbe {
    #[serde(default)]
    pub scheme: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    pub path: String,

    pub port: u16,

    /// Headers, duplicates are kept
    #[serde(default)]
    pub http_headers: Vec<HttpHeader>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

/// Network service exposed by the workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Ports keyed by name, in declaration order
    #[serde(default)]
    pub ports: IndexMap<String, ServicePort>,
}

/// A published port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub port: u16,

    /// Container port, defaults to `port`
    #[serde(default)]
    pub target_port: Option<u16>,

    /// Transport protocol, defaults to TCP
    #[serde(default)]
    pub protocol: Option<String>,
}
