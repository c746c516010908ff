// ABOUTME: Closed error taxonomy returned to every release requester.
// ABOUTME: Clone so one batch-wide failure can be broadcast to many callers.

use crate::batch::BatchAborted;
use crate::deploy::DeployError;
use crate::manifest::PatchError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReleaseError {
    #[error(
        "cluster '{0}' is not managed by this instance of mygitops, check the `cluster` parameter"
    )]
    UnmanagedCluster(String),

    #[error("cannot create deployment: {0}")]
    PatchNotApplicable(String),

    #[error("cannot create deployment: {0}")]
    PatchMalformed(String),

    #[error("cannot create deployment: {0}")]
    CommitFailed(String),

    #[error("cannot push deployment: {0}")]
    PushFailed(String),

    #[error("cannot sync cluster: {0}")]
    SyncFailed(String),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseErrorKind {
    UnmanagedCluster,
    PatchNotApplicable,
    PatchMalformed,
    CommitFailed,
    PushFailed,
    SyncFailed,
}

impl ReleaseError {
    pub fn kind(&self) -> ReleaseErrorKind {
        match self {
            ReleaseError::UnmanagedCluster(_) => ReleaseErrorKind::UnmanagedCluster,
            ReleaseError::PatchNotApplicable(_) => ReleaseErrorKind::PatchNotApplicable,
            ReleaseError::PatchMalformed(_) => ReleaseErrorKind::PatchMalformed,
            ReleaseError::CommitFailed(_) => ReleaseErrorKind::CommitFailed,
            ReleaseError::PushFailed(_) => ReleaseErrorKind::PushFailed,
            ReleaseError::SyncFailed(_) => ReleaseErrorKind::SyncFailed,
        }
    }

    /// Whether the requester, rather than the pipeline, is at fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ReleaseErrorKind::UnmanagedCluster | ReleaseErrorKind::PatchNotApplicable
        )
    }
}

impl From<BatchAborted> for ReleaseError {
    fn from(err: BatchAborted) -> Self {
        ReleaseError::CommitFailed(err.to_string())
    }
}

impl From<DeployError> for ReleaseError {
    fn from(err: DeployError) -> Self {
        let message = err.to_string();
        match err {
            DeployError::NoManifests { .. } | DeployError::NothingPatched { .. } => {
                ReleaseError::PatchNotApplicable(message)
            }
            DeployError::Patch {
                source: PatchError::MultipleHeaders(_) | PatchError::Malformed(_),
                ..
            } => ReleaseError::PatchMalformed(message),
            DeployError::Patch { .. } | DeployError::Discovery(_) | DeployError::Git(_) => {
                ReleaseError::CommitFailed(message)
            }
        }
    }
}
