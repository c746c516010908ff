// ABOUTME: Validated cluster (kube context) name.
// ABOUTME: Cluster names double as directory names under installations/, so path tricks are rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterNameError {
    #[error("cluster name cannot be empty")]
    Empty,

    #[error("cluster name cannot be '.' or '..'")]
    Reserved,

    #[error("invalid character in cluster name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterName(String);

impl ClusterName {
    pub fn new(value: &str) -> Result<Self, ClusterNameError> {
        if value.is_empty() {
            return Err(ClusterNameError::Empty);
        }

        if value == "." || value == ".." {
            return Err(ClusterNameError::Reserved);
        }

        for c in value.chars() {
            if c == '/' || c == '\\' || c.is_whitespace() || c.is_control() {
                return Err(ClusterNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClusterName {
    type Error = ClusterNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ClusterName::new(&value)
    }
}

impl From<ClusterName> for String {
    fn from(value: ClusterName) -> Self {
        value.0
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
