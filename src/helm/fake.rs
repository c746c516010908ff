// ABOUTME: In-memory HelmOps for tests: per-operation failure injection and call recording.
// ABOUTME: add_repo appends to the repository list that list_repos returns.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

use super::{HelmError, HelmOps, HelmRelease, HelmRepo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelmOpKind {
    Init,
    SyncRelease,
    DiffRelease,
    UpdateRepos,
    AddRepo,
    ListRepos,
}

/// A recorded helm call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelmCall {
    Init,
    SyncRelease {
        release: HelmRelease,
        value_files: Vec<PathBuf>,
    },
    DiffRelease {
        release: HelmRelease,
        value_files: Vec<PathBuf>,
    },
    UpdateRepos,
    AddRepo(HelmRepo),
    ListRepos,
}

impl HelmCall {
    pub fn kind(&self) -> HelmOpKind {
        match self {
            HelmCall::Init => HelmOpKind::Init,
            HelmCall::SyncRelease { .. } => HelmOpKind::SyncRelease,
            HelmCall::DiffRelease { .. } => HelmOpKind::DiffRelease,
            HelmCall::UpdateRepos => HelmOpKind::UpdateRepos,
            HelmCall::AddRepo(_) => HelmOpKind::AddRepo,
            HelmCall::ListRepos => HelmOpKind::ListRepos,
        }
    }
}

#[derive(Debug, Default)]
pub struct HelmFake {
    failures: Mutex<HashMap<HelmOpKind, String>>,
    repos: Mutex<Vec<HelmRepo>>,
    calls: Mutex<Vec<HelmCall>>,
}

impl HelmFake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repos(repos: Vec<HelmRepo>) -> Self {
        Self {
            repos: Mutex::new(repos),
            ..Self::default()
        }
    }

    /// Make every call of `kind` fail with `message`.
    pub fn fail_on(&self, kind: HelmOpKind, message: impl Into<String>) {
        self.failures.lock().insert(kind, message.into());
    }

    pub fn heal(&self, kind: HelmOpKind) {
        self.failures.lock().remove(&kind);
    }

    pub fn calls(&self) -> Vec<HelmCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, kind: HelmOpKind) -> usize {
        self.calls.lock().iter().filter(|c| c.kind() == kind).count()
    }

    /// Releases passed to `sync_release`, in call order.
    pub fn synced(&self) -> Vec<HelmRelease> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HelmCall::SyncRelease { release, .. } => Some(release.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HelmCall) -> Result<(), HelmError> {
        let kind = call.kind();
        self.calls.lock().push(call);
        match self.failures.lock().get(&kind) {
            Some(message) => Err(HelmError::CommandFailed {
                command: format!("helm {kind:?} (fake)"),
                output: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HelmOps for HelmFake {
    async fn init(&self) -> Result<(), HelmError> {
        self.record(HelmCall::Init)
    }

    async fn sync_release(
        &self,
        release: &HelmRelease,
        value_files: &[PathBuf],
    ) -> Result<(), HelmError> {
        self.record(HelmCall::SyncRelease {
            release: release.clone(),
            value_files: value_files.to_vec(),
        })
    }

    async fn diff_release(
        &self,
        release: &HelmRelease,
        value_files: &[PathBuf],
    ) -> Result<(), HelmError> {
        self.record(HelmCall::DiffRelease {
            release: release.clone(),
            value_files: value_files.to_vec(),
        })
    }

    async fn update_repos(&self) -> Result<(), HelmError> {
        self.record(HelmCall::UpdateRepos)
    }

    async fn add_repo(&self, repo: &HelmRepo) -> Result<(), HelmError> {
        self.record(HelmCall::AddRepo(repo.clone()))?;
        self.repos.lock().push(repo.clone());
        Ok(())
    }

    async fn list_repos(&self) -> Result<Vec<HelmRepo>, HelmError> {
        self.record(HelmCall::ListRepos)?;
        Ok(self.repos.lock().clone())
    }
}
