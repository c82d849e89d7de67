//! Conversion error types
//!
//! Every error carries the path of the input field it originated from
//! (`api.containers.web.volumes.0.source`). Components report errors
//! relative to what they were given and callers prefix their own segment
//! on the way up, see [`ConvertError::within`].

use miette::Diagnostic;
use std::fmt;
use thiserror::Error;
use wharf_core::ReferenceError;

/// Dotted path of an input field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segments from outermost to innermost
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    fn prepend(&mut self, segment: String) {
        self.0.insert(0, segment);
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// What went wrong
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ConvertErrorKind {
    #[error(transparent)]
    #[diagnostic(
        code(wharf::convert::reference),
        help("references must name workload metadata or a declared resource")
    )]
    Reference(#[from] ReferenceError),

    #[error("failed to parse quantity '{value}': {reason}")]
    #[diagnostic(
        code(wharf::convert::resource_conversion),
        help("use Kubernetes quantities such as '250m', '1', '512Mi' or '2Gi'")
    )]
    ResourceConversion { value: String, reason: String },

    #[error("volume claims can only be set on stateful sets, not on a {kind}")]
    #[diagnostic(
        code(wharf::convert::invalid_claim_context),
        help("set the 'k8s.score.dev/kind' annotation to 'StatefulSet'")
    )]
    InvalidClaimContext { kind: String },

    #[error("conflicting mounts at '{path}': {reason}")]
    #[diagnostic(code(wharf::convert::volume_conflict))]
    VolumeMountConflict { path: String, reason: String },

    #[error("unsupported workload kind '{kind}'")]
    #[diagnostic(
        code(wharf::convert::unsupported_kind),
        help("supported kinds are 'Deployment' and 'StatefulSet'")
    )]
    UnsupportedKind { kind: String },

    #[error("invalid volume source '{source_ref}': {reason}")]
    #[diagnostic(code(wharf::convert::volume_source))]
    InvalidVolumeSource { source_ref: String, reason: String },

    #[error("invalid mount path '{path}': must be absolute")]
    #[diagnostic(code(wharf::convert::mount_path))]
    InvalidMountPath { path: String },

    #[error("invalid file mode '{mode}': must be an octal value no greater than 0777")]
    #[diagnostic(code(wharf::convert::file_mode))]
    InvalidFileMode { mode: String },

    #[error("invalid file content: {reason}")]
    #[diagnostic(code(wharf::convert::file_content))]
    InvalidFileContent { reason: String },

    #[error("missing required field")]
    #[diagnostic(code(wharf::convert::missing_field))]
    MissingField,
}

/// Conversion error with the path of the offending field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertError {
    pub path: FieldPath,
    pub kind: ConvertErrorKind,
}

impl ConvertError {
    pub fn new(kind: impl Into<ConvertErrorKind>) -> Self {
        Self {
            path: FieldPath::new(),
            kind: kind.into(),
        }
    }

    /// Prefix the path with the segment of the enclosing field
    pub fn within(mut self, segment: impl fmt::Display) -> Self {
        self.path.prepend(segment.to_string());
        self
    }

    pub fn kind(&self) -> &ConvertErrorKind {
        &self.kind
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.0.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.path, self.kind)
        }
    }
}

impl std::error::Error for ConvertError {}

impl From<ConvertErrorKind> for ConvertError {
    fn from(kind: ConvertErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ReferenceError> for ConvertError {
    fn from(err: ReferenceError) -> Self {
        Self::new(err)
    }
}

impl Diagnostic for ConvertError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.kind.code()
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.kind.help()
    }
}

/// Attach a path segment to the error of a result
pub trait ResultExt<T> {
    fn within(self, segment: impl fmt::Display) -> Result<T>;
}

impl<T, E: Into<ConvertError>> ResultExt<T> for std::result::Result<T, E> {
    fn within(self, segment: impl fmt::Display) -> Result<T> {
        self.map_err(|e| e.into().within(segment))
    }
}

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_is_built_outside_in() {
        let err = ConvertError::new(ConvertErrorKind::MissingField)
            .within("content")
            .within("files.0")
            .within("containers.web")
            .within("api");

        assert_eq!(err.path.to_string(), "api.containers.web.files.0.content");
        assert_eq!(
            err.to_string(),
            "api.containers.web.files.0.content: missing required field"
        );
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), ConvertErrorKind> =
            Err(ConvertErrorKind::UnsupportedKind {
                kind: "DaemonSet".to_string(),
            });
        let err = result.within("metadata").unwrap_err();

        assert_eq!(err.path.segments(), ["metadata".to_string()]);
        assert!(matches!(err.kind(), ConvertErrorKind::UnsupportedKind { .. }));
    }

    #[test]
    fn test_diagnostic_code() {
        let err = ConvertError::new(ConvertErrorKind::VolumeMountConflict {
            path: "/etc/cfg".to_string(),
            reason: "mounted twice".to_string(),
        });

        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("wharf::convert::volume_conflict"));
    }

    #[test]
    fn test_reference_error_converts() {
        let err: ConvertError = ReferenceError::TooFewSegments {
            reference: "metadata".to_string(),
        }
        .into();

        assert!(matches!(err.kind, ConvertErrorKind::Reference(_)));
        assert_eq!(
            err.to_string(),
            "invalid ref 'metadata': requires at least a prefix and a key"
        );
    }
}
