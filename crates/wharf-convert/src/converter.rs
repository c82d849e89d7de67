//! Conversion entry points
//!
//! A conversion is a pure function of the workload, the resolved resource
//! outputs and the options. Either the full manifest list is returned or
//! an error naming the offending field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wharf_core::{ResourceOutputs, Workload};

use crate::error::{ConvertError, ConvertErrorKind, Result, ResultExt};
use crate::manifest::Manifest;
use crate::workload::WorkloadManifestBuilder;

/// Options for the converter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertOptions {
    /// Namespace set on every manifest
    pub namespace: Option<String>,
    /// Labels added to every manifest and pod template, never to selectors
    pub common_labels: BTreeMap<String, String>,
}

/// Convert workloads into Kubernetes manifests
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConvertOptions,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert one workload
    ///
    /// Error paths start with the workload name.
    pub fn convert(&self, workload: &Workload, outputs: &ResourceOutputs) -> Result<Vec<Manifest>> {
        let name = workload
            .name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ConvertError::new(ConvertErrorKind::MissingField).within("metadata.name")
            })?;

        let manifests = WorkloadManifestBuilder::new(name, workload, outputs, &self.options)
            .build()
            .within(name)?;

        tracing::debug!(
            workload = name,
            manifests = manifests.len(),
            "converted workload"
        );
        Ok(manifests)
    }
}

/// Convert a workload with default options
pub fn convert(workload: &Workload, outputs: &ResourceOutputs) -> Result<Vec<Manifest>> {
    Converter::default().convert(workload, outputs)
}

/// Convert a workload with custom options
pub fn convert_with_options(
    workload: &Workload,
    outputs: &ResourceOutputs,
    options: ConvertOptions,
) -> Result<Vec<Manifest>> {
    Converter::new(options).convert(workload, outputs)
}
