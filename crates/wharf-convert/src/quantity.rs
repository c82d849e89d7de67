//! Container compute resources
//!
//! Maps abstract cpu/memory requests and limits onto Kubernetes
//! `ResourceRequirements`, validating every quantity against the
//! Kubernetes quantity grammar.

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use wharf_core::{ContainerResources, ResourceLimits};

use crate::error::{ConvertErrorKind, Result, ResultExt};

static QUANTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^([+-]?)([0-9]+(?:\.[0-9]*)?|\.[0-9]+)",
        r"(Ki|Mi|Gi|Ti|Pi|Ei|[numkMGTPE]|[eE][+-]?[0-9]+)?$",
    ))
    .expect("valid regex")
});

/// Parse and validate a single quantity
pub fn parse_quantity(value: &str) -> std::result::Result<Quantity, ConvertErrorKind> {
    let trimmed = value.trim();
    let invalid = |reason: &str| ConvertErrorKind::ResourceConversion {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let caps = QUANTITY
        .captures(trimmed)
        .ok_or_else(|| invalid("not a valid quantity"))?;

    if caps.get(1).is_some_and(|sign| sign.as_str() == "-") {
        return Err(invalid("quantity must not be negative"));
    }

    Ok(Quantity(trimmed.to_string()))
}

/// Convert container requests and limits
pub fn convert_resources(
    resources: Option<&ContainerResources>,
) -> Result<Option<ResourceRequirements>> {
    let Some(resources) = resources else {
        return Ok(None);
    };

    let limits = convert_limits(resources.limits.as_ref()).within("limits")?;
    let requests = convert_limits(resources.requests.as_ref()).within("requests")?;

    if limits.is_none() && requests.is_none() {
        return Ok(None);
    }

    Ok(Some(ResourceRequirements {
        limits,
        requests,
        ..Default::default()
    }))
}

fn convert_limits(limits: Option<&ResourceLimits>) -> Result<Option<BTreeMap<String, Quantity>>> {
    let Some(limits) = limits else {
        return Ok(None);
    };

    let mut out = BTreeMap::new();
    if let Some(cpu) = &limits.cpu {
        out.insert("cpu".to_string(), parse_quantity(cpu).within("cpu")?);
    }
    if let Some(memory) = &limits.memory {
        out.insert("memory".to_string(), parse_quantity(memory).within("memory")?);
    }

    Ok(if out.is_empty() { None } else { Some(out) })
}
