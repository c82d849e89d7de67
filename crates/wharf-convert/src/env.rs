//! Environment variable conversion

use k8s_openapi::api::core::v1::EnvVar;
use std::collections::BTreeMap;
use wharf_core::{ResolveMode, Substitutor};

use crate::error::{Result, ResultExt};

/// Resolve every variable value, in variable name order
///
/// Errors are reported at the variable's own path so the failing
/// variable is named in the message.
pub fn convert_variables(
    variables: &BTreeMap<String, String>,
    substitutor: &Substitutor<'_>,
) -> Result<Option<Vec<EnvVar>>> {
    if variables.is_empty() {
        return Ok(None);
    }

    let mut env = Vec::with_capacity(variables.len());
    for (name, value) in variables {
        let resolved = substitutor
            .substitute(value, ResolveMode::General)
            .within(name)?;
        env.push(EnvVar {
            name: name.clone(),
            value: Some(resolved),
            ..Default::default()
        });
    }

    Ok(Some(env))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertErrorKind;
    use wharf_core::{ResourceOutputs, ResourceSpec, Workload};

    #[test]
    fn test_convert_variables() {
        let workload = Workload::new("api").with_resource("db", ResourceSpec::new("postgres"));
        let outputs = ResourceOutputs::new().with("db", "host", "db.internal");
        let sub = Substitutor::new("api", &workload, &outputs);

        let mut variables = BTreeMap::new();
        variables.insert("Z_NAME".to_string(), "${metadata.name}".to_string());
        variables.insert("A_HOST".to_string(), "${resources.db.host}:5432".to_string());

        let env = convert_variables(&variables, &sub).unwrap().unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0].name, "A_HOST");
        assert_eq!(env[0].value.as_deref(), Some("db.internal:5432"));
        assert_eq!(env[1].name, "Z_NAME");
        assert_eq!(env[1].value.as_deref(), Some("api"));
    }

    #[test]
    fn test_empty_variables() {
        let workload = Workload::new("api");
        let outputs = ResourceOutputs::new();
        let sub = Substitutor::new("api", &workload, &outputs);

        assert!(convert_variables(&BTreeMap::new(), &sub).unwrap().is_none());
    }

    #[test]
    fn test_unresolved_variable_is_named() {
        let workload = Workload::new("api");
        let outputs = ResourceOutputs::new();
        let sub = Substitutor::new("api", &workload, &outputs);

        let mut variables = BTreeMap::new();
        variables.insert("DB_HOST".to_string(), "${resources.db.host}".to_string());

        let err = convert_variables(&variables, &sub).unwrap_err();
        assert_eq!(err.path.to_string(), "DB_HOST");
        assert!(matches!(err.kind, ConvertErrorKind::Reference(_)));
    }
}
