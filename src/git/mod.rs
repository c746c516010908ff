// ABOUTME: Git collaborator: the operations the release pipeline needs on the gitops working copy.
// ABOUTME: SystemGit shells out to git; FakeGit records calls for tests.

mod error;
mod fake;
mod system;

pub use error::{GitError, GitErrorKind};
pub use fake::{FakeGit, GitOp, GitOpKind};
pub use system::{DEFAULT_BRANCH, DEFAULT_REMOTE, ROBOT_EMAIL, ROBOT_NAME, SystemGit};

use async_trait::async_trait;
use std::path::Path;

/// Operations on the shared gitops working copy.
///
/// Mutating calls are only ever made from the batcher's drain loop.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Working tree root.
    fn root(&self) -> &Path;

    async fn fetch(&self) -> Result<(), GitError>;

    /// Hard reset to the upstream branch, dropping local drift.
    async fn reset(&self) -> Result<(), GitError>;

    async fn pull(&self, extra_args: &[&str]) -> Result<(), GitError>;

    async fn push(&self) -> Result<(), GitError>;

    async fn add_all(&self) -> Result<(), GitError>;

    async fn commit(&self, message: &str) -> Result<(), GitError>;
}
