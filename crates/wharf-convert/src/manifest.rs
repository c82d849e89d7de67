//! Output manifest objects

use k8s_openapi::Resource;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

/// A manifest produced by a conversion
///
/// Serializes as the wrapped object, including `apiVersion` and `kind`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Manifest {
    ConfigMap(ConfigMap),
    Service(Service),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
}

impl Manifest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigMap(_) => ConfigMap::KIND,
            Self::Service(_) => Service::KIND,
            Self::Deployment(_) => Deployment::KIND,
            Self::StatefulSet(_) => StatefulSet::KIND,
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Self::ConfigMap(_) => ConfigMap::API_VERSION,
            Self::Service(_) => Service::API_VERSION,
            Self::Deployment(_) => Deployment::API_VERSION,
            Self::StatefulSet(_) => StatefulSet::API_VERSION,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ConfigMap(m) => &m.metadata,
            Self::Service(m) => &m.metadata,
            Self::Deployment(m) => &m.metadata,
            Self::StatefulSet(m) => &m.metadata,
        }
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::ConfigMap(m) => &mut m.metadata,
            Self::Service(m) => &mut m.metadata,
            Self::Deployment(m) => &mut m.metadata,
            Self::StatefulSet(m) => &mut m.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Human readable identifier, e.g. `Service/api-svc`
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }
}

impl From<ConfigMap> for Manifest {
    fn from(value: ConfigMap) -> Self {
        Self::ConfigMap(value)
    }
}

impl From<Service> for Manifest {
    fn from(value: Service) -> Self {
        Self::Service(value)
    }
}

impl From<Deployment> for Manifest {
    fn from(value: Deployment) -> Self {
        Self::Deployment(value)
    }
}

impl From<StatefulSet> for Manifest {
    fn from(value: StatefulSet) -> Self {
        Self::StatefulSet(value)
    }
}
