// ABOUTME: Secret values given literally or read from an environment variable.
// ABOUTME: Debug output never shows the resolved or literal secret.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}

impl fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Literal(_) => f.write_str("Literal(<redacted>)"),
            EnvValue::FromEnv { var, .. } => f.debug_struct("FromEnv").field("var", var).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_literal_secrets() {
        let value = EnvValue::Literal("hunter2".to_string());
        assert!(!format!("{value:?}").contains("hunter2"));
    }

    #[test]
    fn env_reference_falls_back_to_default() {
        temp_env::with_var_unset("IMGFERRY_TEST_UNSET_SECRET", || {
            let value = EnvValue::FromEnv {
                var: "IMGFERRY_TEST_UNSET_SECRET".to_string(),
                default: Some("fallback".to_string()),
            };
            assert_eq!(value.resolve().unwrap(), "fallback");
        });
    }

    #[test]
    fn env_reference_without_default_is_an_error() {
        temp_env::with_var_unset("IMGFERRY_TEST_UNSET_SECRET", || {
            let value = EnvValue::FromEnv {
                var: "IMGFERRY_TEST_UNSET_SECRET".to_string(),
                default: None,
            };
            assert!(matches!(value.resolve(), Err(Error::MissingEnvVar(v)) if v == "IMGFERRY_TEST_UNSET_SECRET"));
        });
    }
}
