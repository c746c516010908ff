// ABOUTME: In-memory git backend for tests: records every operation, injects failures on demand.
// ABOUTME: Never touches a repository; the root is just a directory the caller provides.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::GitBackend;
use super::error::GitError;

/// A recorded git operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitOp {
    Fetch,
    Reset,
    Pull(Vec<String>),
    Push,
    AddAll,
    Commit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitOpKind {
    Fetch,
    Reset,
    Pull,
    Push,
    AddAll,
    Commit,
}

impl GitOp {
    pub fn kind(&self) -> GitOpKind {
        match self {
            GitOp::Fetch => GitOpKind::Fetch,
            GitOp::Reset => GitOpKind::Reset,
            GitOp::Pull(_) => GitOpKind::Pull,
            GitOp::Push => GitOpKind::Push,
            GitOp::AddAll => GitOpKind::AddAll,
            GitOp::Commit(_) => GitOpKind::Commit,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    Times(usize),
}

#[derive(Debug)]
pub struct FakeGit {
    root: PathBuf,
    ops: Mutex<Vec<GitOp>>,
    failures: Mutex<HashMap<GitOpKind, Failure>>,
}

impl FakeGit {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ops: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make every call of `kind` fail.
    pub fn fail_always(&self, kind: GitOpKind) {
        self.failures.lock().insert(kind, Failure::Always);
    }

    /// Make the next `times` calls of `kind` fail.
    pub fn fail_times(&self, kind: GitOpKind, times: usize) {
        self.failures.lock().insert(kind, Failure::Times(times));
    }

    pub fn heal(&self, kind: GitOpKind) {
        self.failures.lock().remove(&kind);
    }

    /// Every operation attempted so far, failed ones included.
    pub fn ops(&self) -> Vec<GitOp> {
        self.ops.lock().clone()
    }

    pub fn count(&self, kind: GitOpKind) -> usize {
        self.ops.lock().iter().filter(|op| op.kind() == kind).count()
    }

    pub fn commits(&self) -> Vec<String> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                GitOp::Commit(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: GitOp) -> Result<(), GitError> {
        debug!("FakeGit: {op:?}");
        let kind = op.kind();
        self.ops.lock().push(op);

        let mut failures = self.failures.lock();
        let fail = match failures.get_mut(&kind) {
            Some(Failure::Always) => true,
            Some(Failure::Times(0)) | None => false,
            Some(Failure::Times(remaining)) => {
                *remaining -= 1;
                true
            }
        };

        if fail {
            return Err(GitError::CommandFailed {
                command: format!("git {kind:?}").to_lowercase(),
                output: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GitBackend for FakeGit {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn fetch(&self) -> Result<(), GitError> {
        self.record(GitOp::Fetch)
    }

    async fn reset(&self) -> Result<(), GitError> {
        self.record(GitOp::Reset)
    }

    async fn pull(&self, extra_args: &[&str]) -> Result<(), GitError> {
        self.record(GitOp::Pull(
            extra_args.iter().map(|arg| arg.to_string()).collect(),
        ))
    }

    async fn push(&self) -> Result<(), GitError> {
        self.record(GitOp::Push)
    }

    async fn add_all(&self) -> Result<(), GitError> {
        self.record(GitOp::AddAll)
    }

    async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.record(GitOp::Commit(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fails_requested_number_of_times() {
        let git = FakeGit::new("/tmp/unused");
        git.fail_times(GitOpKind::Push, 2);

        assert!(git.push().await.is_err());
        assert!(git.push().await.is_err());
        assert!(git.push().await.is_ok());
        assert_eq!(git.count(GitOpKind::Push), 3);
    }

    #[tokio::test]
    async fn records_arguments() {
        let git = FakeGit::new("/tmp/unused");
        git.pull(&["-r"]).await.unwrap();
        git.commit("Deploy: x").await.unwrap();

        assert_eq!(
            git.ops(),
            vec![GitOp::Pull(vec!["-r".to_string()]), GitOp::Commit("Deploy: x".to_string())]
        );
        assert_eq!(git.commits(), vec!["Deploy: x".to_string()]);
    }

    #[tokio::test]
    async fn always_failing_until_healed() {
        let git = FakeGit::new("/tmp/unused");
        git.fail_always(GitOpKind::Fetch);
        assert!(git.fetch().await.is_err());
        assert!(git.fetch().await.is_err());

        git.heal(GitOpKind::Fetch);
        assert!(git.fetch().await.is_ok());
    }
}
