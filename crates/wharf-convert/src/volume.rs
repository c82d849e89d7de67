//! Volume mount conversion
//!
//! Turns each volume mount descriptor of a container into a concrete
//! `VolumeMount` plus the volume backing it, or into a persistent claim
//! template for stateful workloads. Overlapping mounts are combined
//! afterwards by [`crate::merge`].
//!
//! Volume sources resolve to either:
//! - a resource identity (`${resources.<name>}`): the backing volume is
//!   picked from the resource outputs (`secretName`, `configMapName`,
//!   `claimName`), falling back to an `emptyDir`
//! - a literal absolute path: a `hostPath` volume

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, HostPathVolumeSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, SecretVolumeSource, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use wharf_core::{ClaimRequest, ResolveMode, ResourceOutputs, Substitutor, VolumeMountSpec};

use crate::error::{ConvertErrorKind, Result, ResultExt};
use crate::kind::WorkloadKind;
use crate::quantity::parse_quantity;

/// Access mode used when a claim does not request any
pub const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";

/// Declaration a mount came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MountOrigin {
    Volume(usize),
    File(usize),
}

impl fmt::Display for MountOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume(index) => write!(f, "volumes.{}", index),
            Self::File(index) => write!(f, "files.{}", index),
        }
    }
}

/// A container mount and the volume it reads from
#[derive(Debug, Clone, PartialEq)]
pub struct MountPlan {
    pub origin: MountOrigin,
    pub mount: VolumeMount,
    /// `None` when the volume comes from a claim template
    pub volume: Option<Volume>,
}

/// Result of converting one volume mount descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedVolume {
    pub plan: MountPlan,
    pub claim: Option<PersistentVolumeClaim>,
}

/// Validate a mount target and strip trailing slashes
pub fn normalize_mount_path(path: &str) -> std::result::Result<String, ConvertErrorKind> {
    if !path.starts_with('/') {
        return Err(ConvertErrorKind::InvalidMountPath {
            path: path.to_string(),
        });
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

/// Pod volume name for a resource, derived from its identity token
pub fn resource_volume_name(token: &str) -> String {
    let digest = hex::encode(Sha256::digest(token.as_bytes()));
    format!("res-{}", &digest[..12])
}

/// Claim template name for a container mount
pub fn claim_name(container: &str, index: usize) -> String {
    format!("{}-claim-{}", container, index)
}

/// Convert one volume mount descriptor
///
/// Errors are relative to the descriptor (`source`, `target`, `claim`).
pub fn convert_volume(
    container: &str,
    index: usize,
    spec: &VolumeMountSpec,
    kind: WorkloadKind,
    substitutor: &Substitutor<'_>,
) -> Result<ConvertedVolume> {
    if spec.claim.is_some() && !kind.supports_claims() {
        return Err(ConvertErrorKind::InvalidClaimContext {
            kind: kind.to_string(),
        })
        .within("claim");
    }

    let target = normalize_mount_path(&spec.target).within("target")?;
    let resolved = substitutor
        .substitute(&spec.source, ResolveMode::VolumeSource)
        .within("source")?;
    let resource = substitutor.resource_by_uid(&resolved);

    let origin = MountOrigin::Volume(index);
    let mount = |name: String| VolumeMount {
        name,
        mount_path: target.clone(),
        sub_path: spec.path.clone().filter(|p| !p.is_empty()),
        read_only: spec.read_only.filter(|read_only| *read_only),
        ..Default::default()
    };

    if let Some(request) = &spec.claim {
        if resource.is_none() {
            return Err(ConvertErrorKind::InvalidVolumeSource {
                source_ref: spec.source.clone(),
                reason: "persistent claims require a resource source".to_string(),
            })
            .within("source");
        }

        let name = claim_name(container, index);
        let claim = build_claim(&name, request).within("claim")?;
        tracing::trace!(container, index, claim = %name, "volume converted to claim template");
        return Ok(ConvertedVolume {
            plan: MountPlan {
                origin,
                mount: mount(name),
                volume: None,
            },
            claim: Some(claim),
        });
    }

    let volume = match resource {
        Some(resource) => resource_volume(&resolved, resource, substitutor.outputs()),
        None if resolved.starts_with('/') => Volume {
            name: format!("{}-vol-{}", container, index),
            host_path: Some(HostPathVolumeSource {
                path: resolved.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        None => {
            return Err(ConvertErrorKind::InvalidVolumeSource {
                source_ref: spec.source.clone(),
                reason: "must be a resource reference or an absolute host path".to_string(),
            })
            .within("source");
        }
    };

    Ok(ConvertedVolume {
        plan: MountPlan {
            origin,
            mount: mount(volume.name.clone()),
            volume: Some(volume),
        },
        claim: None,
    })
}

fn resource_volume(token: &str, resource: &str, outputs: &ResourceOutputs) -> Volume {
    let name = resource_volume_name(token);
    let output = |key: &str| outputs.get(resource, key).map(str::to_string);

    if let Some(secret_name) = output("secretName") {
        Volume {
            name,
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name),
                ..Default::default()
            }),
            ..Default::default()
        }
    } else if let Some(config_map) = output("configMapName") {
        Volume {
            name,
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    } else if let Some(claim_name) = output("claimName") {
        Volume {
            name,
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name,
                ..Default::default()
            }),
            ..Default::default()
        }
    } else {
        Volume {
            name,
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }
    }
}

fn build_claim(name: &str, request: &ClaimRequest) -> Result<PersistentVolumeClaim> {
    let size = parse_quantity(&request.size).within("size")?;
    let access_modes = if request.access_modes.is_empty() {
        vec![DEFAULT_ACCESS_MODE.to_string()]
    } else {
        request.access_modes.clone()
    };

    Ok(PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(access_modes),
            storage_class_name: request.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), size)])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use wharf_core::{ResourceSpec, Workload};

    fn workload() -> Workload {
        Workload::new("api")
            .with_resource("data", ResourceSpec::new("volume"))
            .with_resource("tls", ResourceSpec::new("secret"))
            .with_resource("settings", ResourceSpec::new("config"))
    }

    fn outputs() -> ResourceOutputs {
        ResourceOutputs::new()
            .with("tls", "secretName", "api-tls")
            .with("settings", "configMapName", "api-settings")
    }

    #[test]
    fn test_normalize_mount_path() {
        assert_eq!(normalize_mount_path("/etc/cfg/").unwrap(), "/etc/cfg");
        assert_eq!(normalize_mount_path("/").unwrap(), "/");
        assert!(matches!(
            normalize_mount_path("etc/cfg"),
            Err(ConvertErrorKind::InvalidMountPath { .. })
        ));
    }

    #[test]
    fn test_resource_volume_name_is_stable() {
        let a = resource_volume_name("volume.default#api.data");
        assert_eq!(a, resource_volume_name("volume.default#api.data"));
        assert_ne!(a, resource_volume_name("volume.default#api.other"));
        assert!(a.starts_with("res-"));
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_resource_backed_volumes() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        let tls = convert_volume(
            "web",
            0,
            &VolumeMountSpec::new("${resources.tls}", "/etc/tls"),
            WorkloadKind::Stateless,
            &sub,
        )
        .unwrap();
        let volume = tls.plan.volume.unwrap();
        assert_eq!(volume.name, resource_volume_name("secret.default#api.tls"));
        assert_eq!(volume.secret.unwrap().secret_name.as_deref(), Some("api-tls"));
        assert_eq!(tls.plan.mount.mount_path, "/etc/tls");
        assert_eq!(tls.plan.mount.name, volume.name);
        assert!(tls.claim.is_none());

        let settings = convert_volume(
            "web",
            1,
            &VolumeMountSpec::new("${resources.settings}", "/etc/settings").with_path("app.yaml"),
            WorkloadKind::Stateless,
            &sub,
        )
        .unwrap();
        assert!(settings.plan.volume.unwrap().config_map.is_some());
        assert_eq!(settings.plan.mount.sub_path.as_deref(), Some("app.yaml"));

        let data = convert_volume(
            "web",
            2,
            &VolumeMountSpec::new("${resources.data}", "/data"),
            WorkloadKind::Stateless,
            &sub,
        )
        .unwrap();
        assert!(data.plan.volume.unwrap().empty_dir.is_some());
    }

    #[test]
    fn test_host_path_volume() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        let mut spec = VolumeMountSpec::new("/var/lib/${metadata.name}", "/data");
        spec.read_only = Some(true);
        let converted = convert_volume("web", 3, &spec, WorkloadKind::Stateless, &sub).unwrap();

        let volume = converted.plan.volume.unwrap();
        assert_eq!(volume.name, "web-vol-3");
        assert_eq!(volume.host_path.unwrap().path, "/var/lib/api");
        assert_eq!(converted.plan.mount.read_only, Some(true));
        assert_eq!(converted.plan.origin, MountOrigin::Volume(3));
    }

    #[test]
    fn test_invalid_sources() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        let err = convert_volume(
            "web",
            0,
            &VolumeMountSpec::new("relative/path", "/data"),
            WorkloadKind::Stateless,
            &sub,
        )
        .unwrap_err();
        assert_eq!(err.path.to_string(), "source");
        assert!(matches!(err.kind, ConvertErrorKind::InvalidVolumeSource { .. }));

        let err = convert_volume(
            "web",
            0,
            &VolumeMountSpec::new("${resources.missing}", "/data"),
            WorkloadKind::Stateless,
            &sub,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ConvertErrorKind::Reference(_)));

        let err = convert_volume(
            "web",
            0,
            &VolumeMountSpec::new("${resources.data}", "data"),
            WorkloadKind::Stateless,
            &sub,
        )
        .unwrap_err();
        assert_eq!(err.path.to_string(), "target");
    }

    #[test]
    fn test_claim_requires_stateful_kind() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);
        let spec = VolumeMountSpec::new("${resources.data}", "/data").with_claim("10Gi");

        let err = convert_volume("web", 0, &spec, WorkloadKind::Stateless, &sub).unwrap_err();
        assert_eq!(
            err.kind,
            ConvertErrorKind::InvalidClaimContext {
                kind: "Deployment".to_string()
            }
        );

        let converted = convert_volume("web", 0, &spec, WorkloadKind::Stateful, &sub).unwrap();
        assert!(converted.plan.volume.is_none());
        assert_eq!(converted.plan.mount.name, "web-claim-0");

        let claim = converted.claim.unwrap();
        assert_eq!(claim.metadata.name.as_deref(), Some("web-claim-0"));
        let claim_spec = claim.spec.unwrap();
        assert_eq!(claim_spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
        assert_eq!(
            claim_spec.resources.unwrap().requests.unwrap()["storage"],
            Quantity("10Gi".to_string())
        );
    }

    #[test]
    fn test_claim_context_is_checked_before_source() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);
        let spec = VolumeMountSpec::new("${resources.missing}", "data").with_claim("10Gi");

        let err = convert_volume("web", 0, &spec, WorkloadKind::Stateless, &sub).unwrap_err();
        assert_eq!(err.path.to_string(), "claim");
        assert!(matches!(err.kind, ConvertErrorKind::InvalidClaimContext { .. }));
    }

    #[test]
    fn test_claim_validation() {
        let workload = workload();
        let outputs = outputs();
        let sub = Substitutor::new("api", &workload, &outputs);

        let spec = VolumeMountSpec::new("/var/data", "/data").with_claim("10Gi");
        let err = convert_volume("web", 0, &spec, WorkloadKind::Stateful, &sub).unwrap_err();
        assert!(matches!(err.kind, ConvertErrorKind::InvalidVolumeSource { .. }));

        let spec = VolumeMountSpec::new("${resources.data}", "/data").with_claim("huge");
        let err = convert_volume("web", 0, &spec, WorkloadKind::Stateful, &sub).unwrap_err();
        assert_eq!(err.path.to_string(), "claim.size");
        assert!(matches!(err.kind, ConvertErrorKind::ResourceConversion { .. }));
    }
}
