// ABOUTME: Git collaborator errors with SNAFU context selectors.
// ABOUTME: Failures carry the git sub-command and the tool's diagnostic output.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GitError {
    #[snafu(display("no path provided for repository"))]
    NoPath,

    #[snafu(display("failed to run `{command}`: {source}"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("`{command}` failed: {}", output.trim()))]
    CommandFailed { command: String, output: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitErrorKind {
    NoPath,
    Spawn,
    CommandFailed,
}

impl GitError {
    pub fn kind(&self) -> GitErrorKind {
        match self {
            GitError::NoPath => GitErrorKind::NoPath,
            GitError::Spawn { .. } => GitErrorKind::Spawn,
            GitError::CommandFailed { .. } => GitErrorKind::CommandFailed,
        }
    }

    /// Diagnostic output of the failed command, if it ran.
    pub fn output(&self) -> Option<&str> {
        match self {
            GitError::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}
