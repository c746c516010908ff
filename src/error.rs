// ABOUTME: Application-wide error types for mygitops.
// ABOUTME: Wraps configuration failures and the module errors the CLI surfaces.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::git::GitError;
use crate::helm::HelmError;
use crate::notification::NotificationError;
use crate::release::ReleaseInitError;
use crate::sync::SyncError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found in {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{}: {source}", .path.display())]
    Kubeconfig {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("cluster {0} is not listed in the kubeconfig")]
    UnknownCluster(String),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Helm(#[from] HelmError),

    #[error(transparent)]
    Release(#[from] ReleaseInitError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
