//! Wharf Core - Core types for the workload to Kubernetes converter
//!
//! This crate provides the foundational types used throughout Wharf:
//! - `Workload`: The platform-agnostic workload description
//! - `ResourceSpec` / `ResourceUid`: Resources a workload depends on and their identities
//! - `ResourceOutputs`: Provisioned output values, supplied by the resource provisioner
//! - `Substitutor`: Resolution of `${...}` references against metadata and outputs

pub mod error;
pub mod reference;
pub mod resource;
pub mod workload;

pub use error::{CoreError, Result};
pub use reference::{Reference, ReferenceError, ResolveMode, Substitutor, split_ref_parts};
pub use resource::{DEFAULT_CLASS, ResourceOutputs, ResourceSpec, ResourceUid};
pub use workload::{
    ClaimRequest, ContainerResources, ContainerSpec, FileSpec, HttpHeader, HttpProbe, Probe,
    ResourceLimits, ServicePort, ServiceSpec, VolumeMountSpec, Workload, WorkloadMetadata,
};
