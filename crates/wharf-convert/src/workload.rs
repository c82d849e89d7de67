//! Workload manifest builder
//!
//! Runs the conversion of one workload:
//! `SelectKind -> AssembleContainers -> DeriveNetworkService -> BuildControllerObject`.
//!
//! Manifests are returned in a fixed order: config maps, the network
//! service, the headless service (stateful only), then the controller.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaim, PodSpec, PodTemplateSpec, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, ObjectMeta,
};
use std::collections::BTreeMap;
use wharf_core::{ResourceOutputs, Substitutor, Workload};

use crate::container::assemble_container;
use crate::converter::ConvertOptions;
use crate::error::{Result, ResultExt};
use crate::kind::WorkloadKind;
use crate::manifest::Manifest;
use crate::merge::push_volume;
use crate::service::{
    SELECTOR_LABEL, build_headless_service, build_service, headless_service_name, selector,
};

/// Replica count of every controller object
pub const DEFAULT_REPLICAS: i32 = 1;

/// Pod contents gathered from all containers
#[derive(Debug, Default)]
struct PodParts {
    containers: Vec<Container>,
    volumes: Vec<Volume>,
    claims: Vec<PersistentVolumeClaim>,
}

/// Builds the manifests of a single workload
pub struct WorkloadManifestBuilder<'a> {
    name: &'a str,
    workload: &'a Workload,
    outputs: &'a ResourceOutputs,
    options: &'a ConvertOptions,
}

impl<'a> WorkloadManifestBuilder<'a> {
    pub fn new(
        name: &'a str,
        workload: &'a Workload,
        outputs: &'a ResourceOutputs,
        options: &'a ConvertOptions,
    ) -> Self {
        Self {
            name,
            workload,
            outputs,
            options,
        }
    }

    /// Produce the ordered manifest list
    ///
    /// Errors are relative to the workload, e.g. `containers.web.files.0`.
    pub fn build(&self) -> Result<Vec<Manifest>> {
        let kind = WorkloadKind::from_metadata(&self.workload.metadata)
            .within("metadata.annotations")?;
        tracing::debug!(workload = self.name, kind = %kind, "selected workload kind");

        let substitutor = Substitutor::new(self.name, self.workload, self.outputs);
        let mut manifests = Vec::new();
        let mut pod = PodParts::default();

        for (container_name, spec) in &self.workload.containers {
            let assembled = assemble_container(self.name, container_name, spec, kind, &substitutor)
                .within(format!("containers.{}", container_name))?;

            manifests.extend(assembled.config_maps.into_iter().map(Manifest::from));
            pod.containers.push(assembled.container);
            for volume in assembled.volumes {
                push_volume(&mut pod.volumes, volume);
            }
            pod.claims.extend(assembled.claims);
        }
        tracing::debug!(
            workload = self.name,
            containers = pod.containers.len(),
            volumes = pod.volumes.len(),
            "assembled containers"
        );

        if let Some(service) = build_service(self.name, self.workload.service.as_ref()) {
            tracing::debug!(workload = self.name, "derived network service");
            manifests.push(service.into());
        }

        match kind {
            WorkloadKind::Stateless => manifests.push(self.deployment(pod).into()),
            WorkloadKind::Stateful => {
                manifests.push(build_headless_service(self.name).into());
                manifests.push(self.stateful_set(pod).into());
            }
        }
        tracing::debug!(workload = self.name, kind = %kind, "built controller object");

        for manifest in &mut manifests {
            self.stamp(manifest.metadata_mut());
        }

        Ok(manifests)
    }

    fn deployment(&self, pod: PodParts) -> Deployment {
        Deployment {
            metadata: self.object_meta(),
            spec: Some(DeploymentSpec {
                replicas: Some(DEFAULT_REPLICAS),
                selector: self.label_selector(),
                template: self.pod_template(pod.containers, pod.volumes),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn stateful_set(&self, pod: PodParts) -> StatefulSet {
        StatefulSet {
            metadata: self.object_meta(),
            spec: Some(StatefulSetSpec {
                replicas: Some(DEFAULT_REPLICAS),
                selector: self.label_selector(),
                service_name: headless_service_name(self.name).into(),
                template: self.pod_template(pod.containers, pod.volumes),
                volume_claim_templates: (!pod.claims.is_empty()).then_some(pod.claims),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn object_meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.to_string()),
            ..Default::default()
        }
    }

    fn label_selector(&self) -> LabelSelector {
        LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: SELECTOR_LABEL.to_string(),
                operator: "In".to_string(),
                values: Some(vec![self.name.to_string()]),
            }]),
            ..Default::default()
        }
    }

    fn pod_template(&self, containers: Vec<Container>, volumes: Vec<Volume>) -> PodTemplateSpec {
        let mut labels = self.options.common_labels.clone();
        labels.extend(selector(self.name));

        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers,
                volumes: (!volumes.is_empty()).then_some(volumes),
                ..Default::default()
            }),
        }
    }

    /// Apply the namespace and common labels to a manifest's metadata
    fn stamp(&self, metadata: &mut ObjectMeta) {
        if let Some(namespace) = &self.options.namespace {
            metadata.namespace = Some(namespace.clone());
        }
        if !self.options.common_labels.is_empty() {
            let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
            for (key, value) in &self.options.common_labels {
                labels.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
}
