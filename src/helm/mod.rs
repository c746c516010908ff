// ABOUTME: Reconciliation collaborator: syncs and diffs helm releases against one cluster.
// ABOUTME: HelmCmd drives the helm CLI; HelmFake records calls and injects failures for tests.

mod command;
mod error;
mod fake;

pub use command::{HelmCmd, HelmCmdOptions};
pub use error::HelmError;
pub use fake::{HelmCall, HelmFake, HelmOpKind};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::types::ClusterName;

/// Identity of a helm release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmRelease {
    /// Chart in `repo/name` form, e.g. `stable/redis`.
    pub chart: String,
    /// Chart version as found in the chart's `Chart.yaml`.
    pub version: String,
    /// Release name as seen in `helm ls`.
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for HelmRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}@{} in {})",
            self.name, self.chart, self.version, self.namespace
        )
    }
}

/// A chart repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmRepo {
    pub name: String,
    pub url: String,
}

/// Helm operations against a single cluster.
#[async_trait]
pub trait HelmOps: Send + Sync {
    /// Prepare the client: helm home, plugins, configured repositories.
    async fn init(&self) -> Result<(), HelmError>;

    /// Install or upgrade `release` with the given values files.
    async fn sync_release(
        &self,
        release: &HelmRelease,
        value_files: &[PathBuf],
    ) -> Result<(), HelmError>;

    /// Show what syncing `release` would change.
    async fn diff_release(
        &self,
        release: &HelmRelease,
        value_files: &[PathBuf],
    ) -> Result<(), HelmError>;

    /// Refresh the local cache of every chart repository.
    async fn update_repos(&self) -> Result<(), HelmError>;

    async fn add_repo(&self, repo: &HelmRepo) -> Result<(), HelmError>;

    async fn list_repos(&self) -> Result<Vec<HelmRepo>, HelmError>;
}

/// Builds the helm client for a cluster.
pub trait HelmFactory: Send + Sync {
    fn create(&self, cluster: &ClusterName) -> Arc<dyn HelmOps>;
}

impl<F> HelmFactory for F
where
    F: Fn(&ClusterName) -> Arc<dyn HelmOps> + Send + Sync,
{
    fn create(&self, cluster: &ClusterName) -> Arc<dyn HelmOps> {
        self(cluster)
    }
}

/// Creates one [`HelmCmd`] per cluster, using the cluster name as kube context.
#[derive(Debug, Clone, Default)]
pub struct HelmCmdFactory {
    options: HelmCmdOptions,
}

impl HelmCmdFactory {
    pub fn new(options: HelmCmdOptions) -> Self {
        Self { options }
    }
}

impl HelmFactory for HelmCmdFactory {
    fn create(&self, cluster: &ClusterName) -> Arc<dyn HelmOps> {
        let options = self.options.clone().kube_context(cluster.as_str());
        Arc::new(HelmCmd::new(options))
    }
}
