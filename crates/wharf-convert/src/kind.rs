//! Workload controller kind

use serde_json::Value as JsonValue;
use std::fmt;
use wharf_core::WorkloadMetadata;

use crate::error::ConvertErrorKind;

/// Annotation selecting the controller kind
pub const WORKLOAD_KIND_ANNOTATION: &str = "k8s.score.dev/kind";

/// Controller object produced for a workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkloadKind {
    /// `Deployment`
    #[default]
    Stateless,
    /// `StatefulSet`, the only kind that may carry claim templates
    Stateful,
}

impl WorkloadKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stateless => "Deployment",
            Self::Stateful => "StatefulSet",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Deployment" => Some(Self::Stateless),
            "StatefulSet" => Some(Self::Stateful),
            _ => None,
        }
    }

    /// Read the kind annotation, defaulting to a Deployment when absent
    pub fn from_metadata(metadata: &WorkloadMetadata) -> Result<Self, ConvertErrorKind> {
        match metadata.annotation(WORKLOAD_KIND_ANNOTATION) {
            None => Ok(Self::default()),
            Some(JsonValue::String(value)) => {
                Self::parse(value).ok_or_else(|| ConvertErrorKind::UnsupportedKind {
                    kind: value.clone(),
                })
            }
            Some(other) => Err(ConvertErrorKind::UnsupportedKind {
                kind: other.to_string(),
            }),
        }
    }

    pub fn supports_claims(&self) -> bool {
        matches!(self, Self::Stateful)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
