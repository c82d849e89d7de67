//! Health probe conversion

use k8s_openapi::api::core::v1::{HTTPGetAction, HTTPHeader, Probe};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use wharf_core::HttpProbe;

/// Build an HTTP GET probe
///
/// Path and port are passed through as given. Headers keep their
/// declaration order, including duplicates.
pub fn build_probe(input: &HttpProbe) -> Probe {
    let http_headers = if input.http_headers.is_empty() {
        None
    } else {
        Some(
            input
                .http_headers
                .iter()
                .map(|h| HTTPHeader {
                    name: h.name.clone(),
                    value: h.value.clone(),
                })
                .collect(),
        )
    };

    Probe {
        http_get: Some(HTTPGetAction {
            host: input.host.clone().filter(|h| !h.is_empty()),
            http_headers,
            path: Some(input.path.clone()),
            port: IntOrString::Int(i32::from(input.port)),
            scheme: input.scheme.clone().filter(|s| !s.is_empty()),
        }),
        ..Default::default()
    }
}
