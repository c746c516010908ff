// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup and throwaway gitops repositories with values files.

use mygitops::types::{ClusterName, DeployRequest, TargetImage};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("mygitops=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A values file whose header tracks one image for `trigger_repo`.
#[allow(dead_code)]
pub fn values_yaml(release: &str, trigger_repo: &str) -> String {
    format!(
        "__mygitops:
  chart: stable/{release}
  version: 1.0.0
  name: {release}
  namespace: default
  images:
    {trigger_repo}:
      repository: quay.io/{release}
      tag: initial

replicas: 1
"
    )
}

/// A gitops working copy on disk with an `installations/` tree.
#[allow(dead_code)]
pub struct GitopsRepo {
    dir: TempDir,
}

#[allow(dead_code)]
impl GitopsRepo {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, cluster: &str, file: &str, content: &str) -> PathBuf {
        let dir = self.root().join("installations").join(cluster);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Add `<release>-values.yaml` tracking `trigger_repo`.
    pub fn release(&self, cluster: &str, release: &str, trigger_repo: &str) -> PathBuf {
        self.write(
            cluster,
            &format!("{release}-values.yaml"),
            &values_yaml(release, trigger_repo),
        )
    }

    pub fn read(&self, cluster: &str, file: &str) -> String {
        std::fs::read_to_string(self.root().join("installations").join(cluster).join(file))
            .unwrap()
    }
}

#[allow(dead_code)]
pub fn cluster(name: &str) -> ClusterName {
    ClusterName::new(name).unwrap()
}

#[allow(dead_code)]
pub fn request(trigger_repo: &str, tag: &str, cluster_name: &str) -> DeployRequest {
    DeployRequest::new(
        trigger_repo,
        TargetImage::new("quay.io/app", tag),
        "tester",
        cluster(cluster_name),
    )
}
