// ABOUTME: Secret config values such as the chat webhook URL.
// ABOUTME: Written inline or pulled from the environment so the URL stays out of git.

use serde::Deserialize;
use std::fmt;

use crate::error::{Error, Result};

/// Either the value itself or `{env: VAR, default: ...}`.
///
/// An environment variable that is set but empty counts as unset, so the
/// default (if any) still applies.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SecretValue {
    Inline(String),
    Env {
        env: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl Default for SecretValue {
    fn default() -> Self {
        SecretValue::Inline(String::new())
    }
}

// Inline values are never logged
impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretValue::Inline(value) if value.is_empty() => f.write_str("Inline(\"\")"),
            SecretValue::Inline(_) => f.write_str("Inline(<redacted>)"),
            SecretValue::Env { env, .. } => write!(f, "Env({env})"),
        }
    }
}

impl SecretValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            SecretValue::Inline(value) => Ok(value.clone()),
            SecretValue::Env { env, default } => match std::env::var(env) {
                Ok(value) if !value.is_empty() => Ok(value),
                _ => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(env.clone())),
            },
        }
    }
}
