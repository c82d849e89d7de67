//! Container assembly

use k8s_openapi::api::core::v1::{ConfigMap, Container, PersistentVolumeClaim, Volume};
use wharf_core::{ContainerSpec, Substitutor};

use crate::env::convert_variables;
use crate::error::{Result, ResultExt};
use crate::files::convert_file;
use crate::kind::WorkloadKind;
use crate::merge::collapse_mounts;
use crate::probe::build_probe;
use crate::quantity::convert_resources;
use crate::volume::{MountOrigin, convert_volume};

/// A converted container and everything it contributes to the pod
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContainer {
    pub container: Container,
    /// Pod level volumes backing the container's mounts
    pub volumes: Vec<Volume>,
    pub claims: Vec<PersistentVolumeClaim>,
    pub config_maps: Vec<ConfigMap>,
}

/// Convert one abstract container
///
/// Errors are relative to the container, e.g. `volumes.1.source`.
pub fn assemble_container(
    workload: &str,
    name: &str,
    spec: &ContainerSpec,
    kind: WorkloadKind,
    substitutor: &Substitutor<'_>,
) -> Result<AssembledContainer> {
    tracing::debug!(workload, container = name, "assembling container");

    let resources = convert_resources(spec.resources.as_ref()).within("resources")?;
    let env = convert_variables(&spec.variables, substitutor).within("variables")?;

    let mut plans = Vec::with_capacity(spec.volumes.len() + spec.files.len());
    let mut claims = Vec::new();
    for (index, volume) in spec.volumes.iter().enumerate() {
        let converted = convert_volume(name, index, volume, kind, substitutor)
            .within(MountOrigin::Volume(index))?;
        plans.push(converted.plan);
        claims.extend(converted.claim);
    }

    let mut config_maps = Vec::with_capacity(spec.files.len());
    for (index, file) in spec.files.iter().enumerate() {
        let materialized = convert_file(workload, name, index, file, substitutor)
            .within(MountOrigin::File(index))?;
        config_maps.push(materialized.config_map);
        plans.push(materialized.plan);
    }

    let (volumes, mounts) = collapse_mounts(name, plans)?;

    let container = Container {
        name: name.to_string(),
        image: Some(spec.image.clone()),
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        args: (!spec.args.is_empty()).then(|| spec.args.clone()),
        env,
        resources,
        volume_mounts: (!mounts.is_empty()).then_some(mounts),
        liveness_probe: spec.liveness_probe.as_ref().map(|p| build_probe(&p.http_get)),
        readiness_probe: spec.readiness_probe.as_ref().map(|p| build_probe(&p.http_get)),
        ..Default::default()
    };

    Ok(AssembledContainer {
        container,
        volumes,
        claims,
        config_maps,
    })
}
