//! Network and headless service derivation

use k8s_openapi::api::core::v1::{
    Service, ServicePort as KubeServicePort, ServiceSpec as KubeServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use wharf_core::ServiceSpec;

/// Label selecting the pods of a workload
pub const SELECTOR_LABEL: &str = "score-workload";

/// Port exposed by the headless service of a stateful workload
pub const HEADLESS_PORT: i32 = 99;

/// Protocol used when a port does not name one
pub const DEFAULT_PROTOCOL: &str = "TCP";

pub fn service_name(workload: &str) -> String {
    format!("{}-svc", workload)
}

pub fn headless_service_name(workload: &str) -> String {
    format!("{}-headless-svc", workload)
}

pub(crate) fn selector(workload: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(SELECTOR_LABEL.to_string(), workload.to_string())])
}

fn convert_port(name: &str, port: &wharf_core::ServicePort) -> KubeServicePort {
    let protocol = port
        .protocol
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
    let target_port = port.target_port.filter(|p| *p > 0).unwrap_or(port.port);

    KubeServicePort {
        name: Some(name.to_string()),
        port: i32::from(port.port),
        target_port: Some(IntOrString::Int(i32::from(target_port))),
        protocol: Some(protocol),
        ..Default::default()
    }
}

/// Build the workload's network service
///
/// Returns `None` when no port is declared. Ports keep their declaration
/// order.
pub fn build_service(workload: &str, spec: Option<&ServiceSpec>) -> Option<Service> {
    let spec = spec.filter(|s| !s.ports.is_empty())?;
    let ports = spec
        .ports
        .iter()
        .map(|(name, port)| convert_port(name, port))
        .collect();

    Some(Service {
        metadata: ObjectMeta {
            name: Some(service_name(workload)),
            ..Default::default()
        },
        spec: Some(KubeServiceSpec {
            selector: Some(selector(workload)),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Build the headless discovery service of a stateful workload
pub fn build_headless_service(workload: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(headless_service_name(workload)),
            ..Default::default()
        },
        spec: Some(KubeServiceSpec {
            selector: Some(selector(workload)),
            cluster_ip: Some("None".to_string()),
            ports: Some(vec![KubeServicePort {
                name: Some("default".to_string()),
                port: HEADLESS_PORT,
                target_port: Some(IntOrString::Int(HEADLESS_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
