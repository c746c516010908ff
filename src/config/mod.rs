// ABOUTME: Configuration types and parsing for mygitops.yaml.
// ABOUTME: Loaded from the gitops repository root and passed explicitly to every component.

mod deserialize;
mod secret;
mod kubeconfig;

pub use secret::SecretValue;
pub use kubeconfig::{clusters_from_yaml, load_clusters};

use crate::batch::{DEFAULT_INTERVAL, DEFAULT_MAX_QUEUE_SIZE};
use crate::error::{Error, Result};
use crate::git::{DEFAULT_BRANCH, DEFAULT_REMOTE};
use crate::helm::HelmRepo;
use crate::notification::SlackWebhook;
use crate::release::{DEFAULT_PUSH_ATTEMPTS, DEFAULT_PUSH_RETRY_DELAY, ReleaseOptions};
use crate::sync::DEFAULT_MAX_PARALLEL;
use crate::types::ClusterName;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "mygitops.yaml";
pub const CONFIG_FILENAME_ALT: &str = "mygitops.yml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub helm: HelmConfig,
    pub notification: NotificationConfig,
    pub release: ReleaseConfig,
    pub sync: SyncConfig,
    pub git: GitConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HelmConfig {
    /// Chart repositories added during helm init when missing.
    pub repositories: Vec<HelmRepo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub slack: Option<SlackConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    #[serde(alias = "webhookurl")]
    pub webhook_url: SecretValue,
    pub channel: String,
    pub username: String,
    pub icon: String,
}

impl SlackConfig {
    pub fn webhook(&self) -> Result<SlackWebhook> {
        let url = self.webhook_url.resolve()?;
        Ok(SlackWebhook::new(
            url,
            self.channel.as_str(),
            self.username.as_str(),
            self.icon.as_str(),
        )?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    #[serde(with = "humantime_serde")]
    pub batch_interval: Duration,
    pub max_queue_size: usize,
    pub push_attempts: usize,
    #[serde(with = "humantime_serde")]
    pub push_retry_delay: Duration,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            batch_interval: DEFAULT_INTERVAL,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            push_attempts: DEFAULT_PUSH_ATTEMPTS,
            push_retry_delay: DEFAULT_PUSH_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Releases synced concurrently per cluster; 0 means no limit.
    pub max_parallel: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub remote: String,
    pub branch: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [dir.join(CONFIG_FILENAME), dir.join(CONFIG_FILENAME_ALT)];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Like [`Config::discover`], but a missing file yields the defaults.
    pub fn discover_or_default(dir: &Path) -> Result<Self> {
        match Self::discover(dir) {
            Err(Error::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Release manager options for `clusters`, taking tuning from this config.
    pub fn release_options(&self, clusters: impl IntoIterator<Item = ClusterName>) -> ReleaseOptions {
        ReleaseOptions::new(clusters)
            .batch_interval(self.release.batch_interval)
            .max_queue_size(self.release.max_queue_size)
            .push_attempts(self.release.push_attempts)
            .push_retry_delay(self.release.push_retry_delay)
            .max_parallel(self.sync.max_parallel)
    }
}
