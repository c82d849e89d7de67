//! Resource declarations, identities and provisioned outputs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

/// Class used when a resource does not declare one
pub const DEFAULT_CLASS: &str = "default";

/// A resource the workload depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource type (e.g. `postgres`, `volume`)
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub class: Option<String>,

    /// Explicit id, shares the resource between workloads
    #[serde(default)]
    pub id: Option<String>,
}

impl ResourceSpec {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            class: None,
            id: None,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Globally unique identity of a provisioned resource
///
/// Format: `<type>.<class>#<id>` for resources with an explicit id,
/// `<type>.<class>#<workload>.<resource>` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUid(String);

impl ResourceUid {
    pub fn new(
        workload: &str,
        resource_name: &str,
        resource_type: &str,
        class: Option<&str>,
        id: Option<&str>,
    ) -> Self {
        let class = class.unwrap_or(DEFAULT_CLASS);
        match id {
            Some(id) => Self(format!("{}.{}#{}", resource_type, class, id)),
            None => Self(format!(
                "{}.{}#{}.{}",
                resource_type, class, workload, resource_name
            )),
        }
    }

    /// Identity of a resource declared on `workload`
    pub fn for_resource(workload: &str, resource_name: &str, spec: &ResourceSpec) -> Self {
        Self::new(
            workload,
            resource_name,
            &spec.resource_type,
            spec.class.as_deref(),
            spec.id.as_deref(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved outputs of the resources of one workload
///
/// Keyed by resource name, then output key. Produced by the resource
/// provisioner before conversion starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceOutputs(pub BTreeMap<String, BTreeMap<String, String>>);

impl ResourceOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse outputs from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Set one output value
    pub fn insert(
        &mut self,
        resource: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.0
            .entry(resource.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Builder form of [`ResourceOutputs::insert`]
    pub fn with(
        mut self,
        resource: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(resource, key, value);
        self
    }

    /// All outputs of a resource
    pub fn outputs(&self, resource: &str) -> Option<&BTreeMap<String, String>> {
        self.0.get(resource)
    }

    /// A single output value
    pub fn get(&self, resource: &str, key: &str) -> Option<&str> {
        self.0
            .get(resource)
            .and_then(|outputs| outputs.get(key))
            .map(String::as_str)
    }
}
