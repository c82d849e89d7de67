//! Inline file materialization
//!
//! Each inline file becomes its own config map, a volume reading from it,
//! and a read-only mount of the single key at the file's target. Files
//! sharing a directory are later merged by [`crate::merge`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, ConfigMapVolumeSource, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use wharf_core::{FileSpec, ResolveMode, Substitutor};

use crate::error::{ConvertErrorKind, Result, ResultExt};
use crate::volume::{MountOrigin, MountPlan, normalize_mount_path};

/// Largest permission value accepted for a file
const MAX_FILE_MODE: i32 = 0o777;

/// A file's config map together with its mount
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedFile {
    pub config_map: ConfigMap,
    pub plan: MountPlan,
}

/// Parse an octal permission string such as `0644`
pub fn parse_file_mode(mode: &str) -> std::result::Result<i32, ConvertErrorKind> {
    let invalid = || ConvertErrorKind::InvalidFileMode {
        mode: mode.to_string(),
    };
    let digits = mode.trim();
    if digits.is_empty() {
        return Err(invalid());
    }
    let value = i32::from_str_radix(digits, 8).map_err(|_| invalid())?;
    if value > MAX_FILE_MODE {
        return Err(invalid());
    }
    Ok(value)
}

/// Materialize one inline file
///
/// Errors are relative to the file descriptor.
pub fn convert_file(
    workload: &str,
    container: &str,
    index: usize,
    file: &FileSpec,
    substitutor: &Substitutor<'_>,
) -> Result<MaterializedFile> {
    let target = normalize_mount_path(&file.target).within("target")?;
    let key = target.rsplit('/').next().unwrap_or_default().to_string();
    if key.is_empty() {
        return Err(ConvertErrorKind::InvalidMountPath {
            path: file.target.clone(),
        })
        .within("target");
    }

    let mode = file
        .mode
        .as_deref()
        .map(parse_file_mode)
        .transpose()
        .within("mode")?;

    let (data, binary_data) = match (&file.content, &file.binary_content) {
        (Some(_), Some(_)) => {
            return Err(ConvertErrorKind::InvalidFileContent {
                reason: "content and binaryContent are mutually exclusive".to_string(),
            })
            .within("content");
        }
        (None, None) => return Err(ConvertErrorKind::MissingField).within("content"),
        (Some(content), None) => {
            let value = if file.no_expand {
                content.clone()
            } else {
                substitutor
                    .substitute(content, ResolveMode::General)
                    .within("content")?
            };
            (Some(BTreeMap::from([(key.clone(), value)])), None)
        }
        (None, Some(encoded)) => {
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|e| ConvertErrorKind::InvalidFileContent {
                    reason: format!("binaryContent is not valid base64: {}", e),
                })
                .within("binaryContent")?;
            (None, Some(BTreeMap::from([(key.clone(), ByteString(bytes))])))
        }
    };

    let config_map_name = format!("{}-{}-file-{}", workload, container, index);
    let volume_name = format!("{}-file-{}", container, index);
    tracing::trace!(container, index, config_map = %config_map_name, "materialized file");

    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name.clone()),
            ..Default::default()
        },
        data,
        binary_data,
        ..Default::default()
    };

    let plan = MountPlan {
        origin: MountOrigin::File(index),
        mount: VolumeMount {
            name: volume_name.clone(),
            mount_path: target,
            sub_path: Some(key),
            read_only: Some(true),
            ..Default::default()
        },
        volume: Some(Volume {
            name: volume_name,
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_name.into(),
                default_mode: mode,
                ..Default::default()
            }),
            ..Default::default()
        }),
    };

    Ok(MaterializedFile { config_map, plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wharf_core::{ResourceOutputs, ResourceSpec, Workload};

    fn convert(file: &FileSpec) -> Result<MaterializedFile> {
        let workload = Workload::new("api").with_resource("db", ResourceSpec::new("postgres"));
        let outputs = ResourceOutputs::new().with("db", "host", "db.internal");
        let sub = Substitutor::new("api", &workload, &outputs);
        convert_file("api", "web", 2, file, &sub)
    }

    #[test]
    fn test_text_file() {
        let file = FileSpec::new("/etc/app/app.conf", "host=${resources.db.host}\n");
        let converted = convert(&file).unwrap();

        assert_eq!(converted.config_map.metadata.name.as_deref(), Some("api-web-file-2"));
        let data = converted.config_map.data.unwrap();
        assert_eq!(data["app.conf"], "host=db.internal\n");
        assert!(converted.config_map.binary_data.is_none());

        let mount = &converted.plan.mount;
        assert_eq!(mount.name, "web-file-2");
        assert_eq!(mount.mount_path, "/etc/app/app.conf");
        assert_eq!(mount.sub_path.as_deref(), Some("app.conf"));
        assert_eq!(mount.read_only, Some(true));
        assert_eq!(converted.plan.origin, MountOrigin::File(2));

        let volume = converted.plan.volume.unwrap();
        assert_eq!(volume.name, "web-file-2");
        assert!(volume.config_map.is_some());
    }

    #[test]
    fn test_no_expand_keeps_placeholders() {
        let mut file = FileSpec::new("/etc/app/tpl", "${not.resolved}");
        file.no_expand = true;

        let converted = convert(&file).unwrap();
        assert_eq!(converted.config_map.data.unwrap()["tpl"], "${not.resolved}");
    }

    #[test]
    fn test_binary_file_and_mode() {
        let file = FileSpec {
            target: "/bin/hello".to_string(),
            mode: Some("0755".to_string()),
            binary_content: Some("aGVsbG8=".to_string()),
            ..Default::default()
        };

        let converted = convert(&file).unwrap();
        let binary = converted.config_map.binary_data.unwrap();
        assert_eq!(binary["hello"], ByteString(b"hello".to_vec()));
        assert!(converted.config_map.data.is_none());

        let volume = converted.plan.volume.unwrap();
        assert_eq!(volume.config_map.unwrap().default_mode, Some(0o755));
    }

    #[test]
    fn test_file_mode_parsing() {
        assert_eq!(parse_file_mode("0644").unwrap(), 0o644);
        assert_eq!(parse_file_mode("600").unwrap(), 0o600);
        assert!(parse_file_mode("0999").is_err());
        assert!(parse_file_mode("1777").is_err());
        assert!(parse_file_mode("").is_err());
    }

    #[test]
    fn test_invalid_files() {
        let err = convert(&FileSpec {
            target: "/etc/empty".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind, ConvertErrorKind::MissingField);
        assert_eq!(err.path.to_string(), "content");

        let err = convert(&FileSpec {
            target: "/etc/both".to_string(),
            content: Some("a".to_string()),
            binary_content: Some("YQ==".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err.kind, ConvertErrorKind::InvalidFileContent { .. }));

        let err = convert(&FileSpec {
            target: "/etc/bad".to_string(),
            binary_content: Some("not base64!".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.path.to_string(), "binaryContent");

        let err = convert(&FileSpec::new("relative.conf", "x")).unwrap_err();
        assert_eq!(err.path.to_string(), "target");

        let err = convert(&FileSpec::new("/etc/x", "${resources.cache.host}")).unwrap_err();
        assert_eq!(err.path.to_string(), "content");
        assert!(matches!(err.kind, ConvertErrorKind::Reference(_)));
    }
}
