// ABOUTME: Error types for helm operations.
// ABOUTME: Command failures keep helm's combined output for the operator.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HelmError {
    #[error("helm client is not initialized")]
    NotInitialized,

    #[error("cannot prepare helm home {path}: {source}")]
    HelmHome {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[failed] {command}: {}", .output.trim())]
    CommandFailed { command: String, output: String },

    #[error("cannot read repository list {path}: {source}")]
    ReadRepos {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {path}: {source}")]
    ParseRepos {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
