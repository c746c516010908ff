// ABOUTME: Cluster reconciliation: turn a cluster's values files into helm releases and apply them.
// ABOUTME: Releases are synced or diffed in parallel through the bounded fan-out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::fanout::{FanOut, join_errors};
use crate::helm::{HelmError, HelmOps, HelmRelease};
use crate::manifest::{self, HeaderError};
use crate::types::ClusterName;

/// Releases synced concurrently unless configured otherwise.
pub const DEFAULT_MAX_PARALLEL: usize = 15;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("cannot list manifests for cluster '{cluster}': {source}")]
    Discovery {
        cluster: ClusterName,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifests:\n{}", join_errors(.0))]
    InvalidManifests(Vec<String>),

    #[error("failed to refresh chart repositories: {0}")]
    RepoUpdate(#[source] HelmError),

    #[error("{} release(s) failed:\n{}", .0.len(), join_errors(.0))]
    Releases(Vec<HelmError>),
}

/// One helm release and the values files it is installed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseJob {
    pub release: HelmRelease,
    pub value_files: Vec<PathBuf>,
}

pub struct ClusterSync {
    root: PathBuf,
    cluster: ClusterName,
    helm: Arc<dyn HelmOps>,
    fanout: FanOut,
}

impl ClusterSync {
    pub fn new(root: impl Into<PathBuf>, cluster: ClusterName, helm: Arc<dyn HelmOps>) -> Self {
        Self {
            root: root.into(),
            cluster,
            helm,
            fanout: FanOut::new(DEFAULT_MAX_PARALLEL),
        }
    }

    /// Zero runs every release at once.
    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.fanout = FanOut::new(max_parallel);
        self
    }

    pub fn cluster(&self) -> &ClusterName {
        &self.cluster
    }

    pub fn helm(&self) -> &Arc<dyn HelmOps> {
        &self.helm
    }

    /// One job per values file. Any unreadable or invalid header fails the whole set.
    pub fn releases(&self) -> Result<Vec<ReleaseJob>, SyncError> {
        let manifests = manifest::find_manifests(&self.root, &self.cluster).map_err(|source| {
            SyncError::Discovery {
                cluster: self.cluster.clone(),
                source,
            }
        })?;

        for raw in &manifests.raw {
            warn!("Raw manifests are not synced yet, skipping {}", raw.display());
        }

        let mut jobs = Vec::with_capacity(manifests.values.len());
        let mut problems = Vec::new();
        for path in manifests.values {
            match manifest::load_valid_header(&path) {
                Ok(header) => {
                    let mut value_files = vec![path.clone()];
                    value_files.extend(manifest::secrets_file_for(&path));
                    jobs.push(ReleaseJob {
                        release: header.release(),
                        value_files,
                    });
                }
                Err(e) => problems.push(describe(&path, &e)),
            }
        }

        if !problems.is_empty() {
            return Err(SyncError::InvalidManifests(problems));
        }
        Ok(jobs)
    }

    /// Install or upgrade every release of the cluster.
    pub async fn sync(&self) -> Result<(), SyncError> {
        let jobs = self.releases()?;
        info!("Syncing {} release(s) on {}", jobs.len(), self.cluster);

        let helm = &self.helm;
        let errors = self
            .fanout
            .run(jobs, |job| async move {
                debug!("Syncing release {}", job.release);
                helm.sync_release(&job.release, &job.value_files).await
            })
            .await;

        if !errors.is_empty() {
            return Err(SyncError::Releases(errors));
        }
        info!("Cluster {} synced", self.cluster);
        Ok(())
    }

    /// Refresh chart repositories, then sync.
    pub async fn refresh_and_sync(&self) -> Result<(), SyncError> {
        self.helm.update_repos().await.map_err(SyncError::RepoUpdate)?;
        self.sync().await
    }

    /// Diff every release of the cluster against what is installed.
    pub async fn diff(&self) -> Result<(), SyncError> {
        let jobs = self.releases()?;
        let helm = &self.helm;
        let errors = self
            .fanout
            .run(jobs, |job| async move {
                helm.diff_release(&job.release, &job.value_files).await
            })
            .await;

        if !errors.is_empty() {
            return Err(SyncError::Releases(errors));
        }
        Ok(())
    }
}

fn describe(path: &Path, error: &HeaderError) -> String {
    format!("Manifest {}: {error}", path.display())
}

/// One line per values file whose header is missing, unreadable or incomplete.
pub fn validate(root: &Path, cluster: &ClusterName) -> Result<Vec<String>, SyncError> {
    let manifests =
        manifest::find_manifests(root, cluster).map_err(|source| SyncError::Discovery {
            cluster: cluster.clone(),
            source,
        })?;

    Ok(manifests
        .values
        .iter()
        .filter_map(|path| {
            manifest::load_valid_header(path)
                .err()
                .map(|e| describe(path, &e))
        })
        .collect())
}
