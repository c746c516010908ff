// ABOUTME: Release orchestration: accept deploy requests and report when they are live.
// ABOUTME: The batched manager commits each request and syncs each touched cluster once per batch.

mod error;
mod manager;

pub use error::{ReleaseError, ReleaseErrorKind};
pub use manager::{
    BatchedReleaseManager, DEFAULT_PUSH_ATTEMPTS, DEFAULT_PUSH_RETRY_DELAY, ReleaseInitError,
    ReleaseOptions,
};

use async_trait::async_trait;

use crate::types::DeployRequest;

#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// Resolves once the request is committed, pushed and synced to its cluster,
    /// or with the first failure along the way.
    async fn request_release(&self, request: DeployRequest) -> Result<(), ReleaseError>;
}
