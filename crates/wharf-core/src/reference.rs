//! Symbolic reference resolution
//!
//! Strings in a workload may embed `${<reference>}` placeholders (`$$` is a
//! literal `$`). A reference is a dotted path whose first segment selects
//! the namespace it is looked up in:
//!
//! | Reference                  | Resolves to                                   |
//! |----------------------------|-----------------------------------------------|
//! | `metadata.<key>...`        | workload metadata, nested objects are walked  |
//! | `resources.<name>.<key>`   | an output of a provisioned resource           |
//! | `resources.<name>`         | the resource identity (volume sources only)   |
//!
//! A literal dot inside a segment is written `\.`.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::resource::{ResourceOutputs, ResourceSpec, ResourceUid};
use crate::workload::{Workload, WorkloadMetadata};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\$|\{([a-zA-Z0-9.\-_\\]+)\})").expect("valid regex"));

/// Reference resolution failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("invalid ref '{reference}': requires at least a prefix and a key")]
    TooFewSegments { reference: String },

    #[error(
        "invalid ref '{reference}': unknown reference root '{root}', \
         use $$ to escape the substitution"
    )]
    UnknownRoot { reference: String, root: String },

    #[error("invalid ref '{reference}': unknown metadata key '{key}'")]
    UnknownMetadataKey { reference: String, key: String },

    #[error("invalid ref '{reference}': requires a resource name and an output key")]
    MissingOutputKey { reference: String },

    #[error("invalid ref '{reference}': no known resource '{resource}'")]
    UnknownResource { reference: String, resource: String },

    #[error("invalid ref '{reference}': resource '{resource}' has no output '{key}'")]
    MissingOutput {
        reference: String,
        resource: String,
        key: String,
    },
}

/// Where a reference is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Variables, file content and everything else
    General,
    /// Volume sources, which may also address a resource by identity
    VolumeSource,
}

/// A parsed reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `metadata.<path>`
    Metadata(Vec<String>),
    /// `resources.<name>.<key>`
    ResourceOutput { resource: String, key: String },
    /// `resources.<name>` in a volume source
    ResourceIdentity { resource: String },
}

impl Reference {
    /// Parse a reference (the text between `${` and `}`)
    pub fn parse(reference: &str, mode: ResolveMode) -> Result<Self, ReferenceError> {
        let mut parts = split_ref_parts(reference);
        if parts.len() < 2 {
            return Err(ReferenceError::TooFewSegments {
                reference: reference.to_string(),
            });
        }

        let root = parts.remove(0);
        match root.as_str() {
            "metadata" => Ok(Reference::Metadata(parts)),
            "resources" if parts.len() == 1 => match mode {
                ResolveMode::VolumeSource => Ok(Reference::ResourceIdentity {
                    resource: parts.remove(0),
                }),
                ResolveMode::General => Err(ReferenceError::MissingOutputKey {
                    reference: reference.to_string(),
                }),
            },
            "resources" => {
                let resource = parts.remove(0);
                Ok(Reference::ResourceOutput {
                    resource,
                    key: parts.join("."),
                })
            }
            _ => Err(ReferenceError::UnknownRoot {
                reference: reference.to_string(),
                root,
            }),
        }
    }
}

/// Split a reference on unescaped dots
pub fn split_ref_parts(reference: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = reference.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                chars.next();
                current.push('.');
            }
            '.' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Resolves references for a single workload
///
/// Holds borrowed, read-only views of the inputs only, so one workload's
/// conversion never observes another's state.
#[derive(Debug, Clone, Copy)]
pub struct Substitutor<'a> {
    workload: &'a str,
    metadata: &'a WorkloadMetadata,
    resources: &'a IndexMap<String, ResourceSpec>,
    outputs: &'a ResourceOutputs,
}

impl<'a> Substitutor<'a> {
    pub fn new(
        workload_name: &'a str,
        workload: &'a Workload,
        outputs: &'a ResourceOutputs,
    ) -> Self {
        Self {
            workload: workload_name,
            metadata: &workload.metadata,
            resources: &workload.resources,
            outputs,
        }
    }

    /// Identity token of a declared resource
    pub fn resource_uid(&self, resource: &str) -> Option<ResourceUid> {
        self.resources
            .get(resource)
            .map(|spec| ResourceUid::for_resource(self.workload, resource, spec))
    }

    /// Name of the declared resource whose identity token is `token`
    pub fn resource_by_uid(&self, token: &str) -> Option<&'a str> {
        self.resources
            .iter()
            .find(|(name, spec)| {
                ResourceUid::for_resource(self.workload, name, spec).as_str() == token
            })
            .map(|(name, _)| name.as_str())
    }

    /// Provisioned outputs visible to this workload
    pub fn outputs(&self) -> &'a ResourceOutputs {
        self.outputs
    }

    /// Resolve a single reference to its value
    pub fn resolve(&self, reference: &str, mode: ResolveMode) -> Result<String, ReferenceError> {
        match Reference::parse(reference, mode)? {
            Reference::Metadata(path) => match self.metadata.lookup(&path) {
                Some(JsonValue::String(s)) => Ok(s.clone()),
                Some(other) => Ok(other.to_string()),
                None => Err(ReferenceError::UnknownMetadataKey {
                    reference: reference.to_string(),
                    key: path.join("."),
                }),
            },
            Reference::ResourceIdentity { resource } => self
                .resource_uid(&resource)
                .map(|uid| uid.to_string())
                .ok_or_else(|| ReferenceError::UnknownResource {
                    reference: reference.to_string(),
                    resource,
                }),
            Reference::ResourceOutput { resource, key } => {
                if !self.resources.contains_key(&resource) {
                    return Err(ReferenceError::UnknownResource {
                        reference: reference.to_string(),
                        resource,
                    });
                }
                self.outputs
                    .get(&resource, &key)
                    .map(str::to_string)
                    .ok_or_else(|| ReferenceError::MissingOutput {
                        reference: reference.to_string(),
                        resource,
                        key,
                    })
            }
        }
    }

    /// Expand every placeholder in `input`
    pub fn substitute(&self, input: &str, mode: ResolveMode) -> Result<String, ReferenceError> {
        let mut result = String::with_capacity(input.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(input) {
            let Some(whole) = caps.get(0) else { continue };
            result.push_str(&input[last..whole.start()]);
            result.push_str(&self.expand(&caps, mode)?);
            last = whole.end();
        }
        result.push_str(&input[last..]);

        Ok(result)
    }

    fn expand(&self, caps: &Captures<'_>, mode: ResolveMode) -> Result<String, ReferenceError> {
        match caps.get(2) {
            Some(reference) => self.resolve(reference.as_str(), mode),
            None => Ok("$".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> Workload {
        Workload::from_yaml(
            r#"
metadata:
  name: api
  team: payments
  labels:
    app.tier: backend
    nested:
      depth: 2
resources:
  db:
    type: postgres
  data:
    type: volume
    id: shared-data
"#,
        )
        .unwrap()
    }

    fn outputs() -> ResourceOutputs {
        ResourceOutputs::new()
            .with("db", "host", "db.internal")
            .with("db", "conn.url", "postgres://db")
    }

    #[test]
    fn test_split_ref_parts() {
        assert_eq!(split_ref_parts("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(split_ref_parts(r"a.b\.c"), vec!["a", "b.c"]);
        assert_eq!(split_ref_parts("single"), vec!["single"]);
        assert_eq!(split_ref_parts(r"a\b"), vec![r"a\b"]);
    }

    #[test]
    fn test_parse_references() {
        assert_eq!(
            Reference::parse("metadata.name", ResolveMode::General).unwrap(),
            Reference::Metadata(vec!["name".to_string()])
        );
        assert_eq!(
            Reference::parse("resources.db.host", ResolveMode::General).unwrap(),
            Reference::ResourceOutput {
                resource: "db".to_string(),
                key: "host".to_string()
            }
        );
        assert_eq!(
            Reference::parse("resources.data", ResolveMode::VolumeSource).unwrap(),
            Reference::ResourceIdentity {
                resource: "data".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(matches!(
            Reference::parse("metadata", ResolveMode::General),
            Err(ReferenceError::TooFewSegments { .. })
        ));
        assert!(matches!(
            Reference::parse("resources.db", ResolveMode::General),
            Err(ReferenceError::MissingOutputKey { .. })
        ));
        assert!(matches!(
            Reference::parse("env.HOME", ResolveMode::General),
            Err(ReferenceError::UnknownRoot { ref root, .. }) if root == "env"
        ));
    }

    #[test]
    fn test_resolve_metadata() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        assert_eq!(sub.resolve("metadata.name", ResolveMode::General).unwrap(), "api");
        assert_eq!(
            sub.resolve(r"metadata.labels.app\.tier", ResolveMode::General)
                .unwrap(),
            "backend"
        );
        // Non-string values are JSON encoded
        assert_eq!(
            sub.resolve("metadata.labels.nested", ResolveMode::General)
                .unwrap(),
            r#"{"depth":2}"#
        );
        assert!(matches!(
            sub.resolve("metadata.owner", ResolveMode::General),
            Err(ReferenceError::UnknownMetadataKey { ref key, .. }) if key == "owner"
        ));
    }

    #[test]
    fn test_resolve_resource_outputs() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        assert_eq!(
            sub.resolve("resources.db.host", ResolveMode::General).unwrap(),
            "db.internal"
        );
        assert_eq!(
            sub.resolve("resources.db.conn.url", ResolveMode::General)
                .unwrap(),
            "postgres://db"
        );
        assert!(matches!(
            sub.resolve("resources.db.password", ResolveMode::General),
            Err(ReferenceError::MissingOutput { ref key, .. }) if key == "password"
        ));
        assert!(matches!(
            sub.resolve("resources.cache.host", ResolveMode::General),
            Err(ReferenceError::UnknownResource { ref resource, .. }) if resource == "cache"
        ));
    }

    #[test]
    fn test_resolve_resource_identity() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        assert_eq!(
            sub.resolve("resources.db", ResolveMode::VolumeSource).unwrap(),
            "postgres.default#api.db"
        );
        assert_eq!(
            sub.resolve("resources.data", ResolveMode::VolumeSource).unwrap(),
            "volume.default#shared-data"
        );
        assert!(matches!(
            sub.resolve("resources.missing", ResolveMode::VolumeSource),
            Err(ReferenceError::UnknownResource { .. })
        ));
        // Outputs still resolve in volume source mode
        assert_eq!(
            sub.resolve("resources.db.host", ResolveMode::VolumeSource)
                .unwrap(),
            "db.internal"
        );
    }

    #[test]
    fn test_resource_by_uid() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        assert_eq!(sub.resource_by_uid("postgres.default#api.db"), Some("db"));
        assert_eq!(sub.resource_by_uid("volume.default#shared-data"), Some("data"));
        assert_eq!(sub.resource_by_uid("/var/data"), None);
    }

    #[test]
    fn test_substitute() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        assert_eq!(
            sub.substitute(
                "postgres://${resources.db.host}:5432/${metadata.name}",
                ResolveMode::General
            )
            .unwrap(),
            "postgres://db.internal:5432/api"
        );
        assert_eq!(sub.substitute("plain text", ResolveMode::General).unwrap(), "plain text");
        assert_eq!(sub.substitute("cost: $$5", ResolveMode::General).unwrap(), "cost: $5");
        assert_eq!(
            sub.substitute("$$${metadata.team}", ResolveMode::General).unwrap(),
            "$payments"
        );
        // Not a placeholder, kept verbatim
        assert_eq!(sub.substitute("$HOME ${}", ResolveMode::General).unwrap(), "$HOME ${}");
    }

    #[test]
    fn test_substitute_fails_on_unresolved() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        let err = sub
            .substitute("${resources.db.user}", ResolveMode::General)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid ref 'resources.db.user': resource 'db' has no output 'user'"
        );
    }
}
