//! Wharf Convert - Workload to Kubernetes manifest converter
//!
//! This crate turns a [`wharf_core::Workload`] and the outputs of its
//! provisioned resources into typed Kubernetes manifests:
//!
//! | Workload                      | Manifests                                   |
//! |-------------------------------|---------------------------------------------|
//! | inline `files`                | one `ConfigMap` per file                    |
//! | `service.ports`               | `Service` named `<workload>-svc`            |
//! | default kind                  | `Deployment`                                |
//! | `k8s.score.dev/kind: StatefulSet` | headless `Service` and a `StatefulSet`  |
//!
//! Mounts that share a directory are merged into a single projected
//! volume, since a container may only mount one volume per path.
//!
//! # Example
//!
//! ```no_run
//! use wharf_core::{ResourceOutputs, Workload};
//! use wharf_convert::convert;
//!
//! let workload = Workload::from_yaml(r#"
//! metadata:
//!   name: api
//! containers:
//!   web:
//!     image: app:1.0
//! "#).unwrap();
//!
//! let manifests = convert(&workload, &ResourceOutputs::new()).unwrap();
//! for manifest in &manifests {
//!     println!("{}", manifest.display_name());
//! }
//! ```

pub mod container;
pub mod converter;
pub mod env;
pub mod error;
pub mod files;
pub mod kind;
pub mod manifest;
pub mod merge;
pub mod probe;
pub mod quantity;
pub mod service;
pub mod volume;
pub mod workload;

pub use container::{AssembledContainer, assemble_container};
pub use converter::{ConvertOptions, Converter, convert, convert_with_options};
pub use error::{ConvertError, ConvertErrorKind, FieldPath, Result, ResultExt};
pub use kind::{WORKLOAD_KIND_ANNOTATION, WorkloadKind};
pub use manifest::Manifest;
pub use service::{HEADLESS_PORT, SELECTOR_LABEL, headless_service_name, service_name};
pub use workload::{DEFAULT_REPLICAS, WorkloadManifestBuilder};
