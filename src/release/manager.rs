// ABOUTME: Batched release manager: one commit per request, one push and sync per batch.
// ABOUTME: Callers wait twice, first for their commit, then for their cluster's next sync.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ReleaseError, ReleaseManager};
use crate::batch::{
    BatchError, BatchEvent, Batcher, BatcherOptions, DEFAULT_INTERVAL, DEFAULT_MAX_QUEUE_SIZE, Job,
};
use crate::deploy;
use crate::git::{GitBackend, GitError};
use crate::helm::{HelmError, HelmFactory};
use crate::sync::{ClusterSync, DEFAULT_MAX_PARALLEL};
use crate::types::{ClusterName, DeployRequest};
use crate::waitlist::{PendingResult, Waitlist};

pub const DEFAULT_PUSH_ATTEMPTS: usize = 4;
pub const DEFAULT_PUSH_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ReleaseInitError {
    #[error("no clusters to manage")]
    NoClusters,

    #[error("cannot initialize helm for cluster {cluster}: {source}")]
    Helm {
        cluster: ClusterName,
        #[source]
        source: HelmError,
    },

    #[error(transparent)]
    Batch(#[from] BatchError),
}

#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    pub clusters: Vec<ClusterName>,
    pub batch_interval: Duration,
    pub max_queue_size: usize,
    pub push_attempts: usize,
    pub push_retry_delay: Duration,
    pub max_parallel: usize,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            clusters: Vec::new(),
            batch_interval: DEFAULT_INTERVAL,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            push_attempts: DEFAULT_PUSH_ATTEMPTS,
            push_retry_delay: DEFAULT_PUSH_RETRY_DELAY,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

impl ReleaseOptions {
    pub fn new(clusters: impl IntoIterator<Item = ClusterName>) -> Self {
        Self {
            clusters: clusters.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Total pushes tried per batch, at least one.
    pub fn push_attempts(mut self, attempts: usize) -> Self {
        self.push_attempts = attempts.max(1);
        self
    }

    pub fn push_retry_delay(mut self, delay: Duration) -> Self {
        self.push_retry_delay = delay;
        self
    }

    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }
}

struct ClusterState {
    sync: ClusterSync,
    waitlist: Waitlist<ReleaseError>,
}

/// State shared between request handlers and the batch hooks.
struct Pipeline {
    git: Arc<dyn GitBackend>,
    clusters: BTreeMap<ClusterName, ClusterState>,
    push_attempts: usize,
    push_retry_delay: Duration,
}

impl Pipeline {
    /// Pre-batch: bring the working copy back to the upstream branch.
    async fn converge(&self) -> Result<(), ReleaseError> {
        let converge_failed =
            |e: GitError| ReleaseError::CommitFailed(format!("cannot update gitops repo: {e}"));
        self.git.fetch().await.map_err(converge_failed)?;
        self.git.reset().await.map_err(converge_failed)?;
        Ok(())
    }

    async fn push_with_retry(&self) -> Result<(), GitError> {
        let mut attempt = 1;
        loop {
            match self.git.push().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.push_attempts => return Err(e),
                Err(e) => {
                    warn!("Retrying git push: {e}");
                    tokio::time::sleep(self.push_retry_delay).await;
                    if let Err(e) = self.git.pull(&["-r"]).await {
                        warn!("Git pull -r failed: {e}");
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Post-batch: publish the batch's commits, then sync every cluster someone waits on.
    async fn publish(&self) -> Result<(), ReleaseError> {
        if let Err(e) = self.push_with_retry().await {
            let err = ReleaseError::PushFailed(e.to_string());
            for (cluster, state) in &self.clusters {
                if !state.waitlist.is_empty() {
                    let notified = state.waitlist.all_error(err.clone());
                    debug!("Told {notified} caller(s) waiting on {cluster} that the push failed");
                    state.waitlist.clear();
                }
            }
            return Err(err);
        }

        for (cluster, state) in &self.clusters {
            if state.waitlist.is_empty() {
                continue;
            }

            info!("Syncing cluster {cluster}");
            match state.sync.refresh_and_sync().await {
                Ok(()) => {
                    state.waitlist.all_done();
                    info!("Done syncing cluster {cluster}");
                }
                Err(e) => {
                    error!("Error syncing cluster {cluster}: {e}");
                    state
                        .waitlist
                        .all_error(ReleaseError::SyncFailed(e.to_string()));
                }
            }
            state.waitlist.clear();
        }

        Ok(())
    }

    /// The per-request job: commit the request, then wait for the batch's sync.
    fn deploy_job(
        self: Arc<Self>,
        request: DeployRequest,
        pending: PendingResult<ReleaseError>,
    ) -> Job<ReleaseError> {
        Box::pin(async move {
            debug!("New deploy: {request}");
            deploy::create(self.git.as_ref(), &request).await?;

            // Registered from the drain loop, so always before this batch's broadcast
            if let Some(state) = self.clusters.get(&request.cluster) {
                state.waitlist.add(pending);
            }
            Ok(())
        })
    }
}

/// [`ReleaseManager`] that funnels every request through one [`Batcher`].
pub struct BatchedReleaseManager {
    pipeline: Arc<Pipeline>,
    batcher: Batcher<ReleaseError>,
    drain: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

impl BatchedReleaseManager {
    /// Initialize one helm client, sync and waitlist per cluster, then start batching.
    pub async fn init(
        options: ReleaseOptions,
        git: Arc<dyn GitBackend>,
        helm_factory: &dyn HelmFactory,
    ) -> Result<Self, ReleaseInitError> {
        if options.clusters.is_empty() {
            return Err(ReleaseInitError::NoClusters);
        }

        let mut clusters = BTreeMap::new();
        for cluster in options.clusters {
            let helm = helm_factory.create(&cluster);
            helm.init()
                .await
                .map_err(|source| ReleaseInitError::Helm {
                    cluster: cluster.clone(),
                    source,
                })?;

            let sync = ClusterSync::new(git.root(), cluster.clone(), helm)
                .max_parallel(options.max_parallel);
            clusters.insert(
                cluster,
                ClusterState {
                    sync,
                    waitlist: Waitlist::new(),
                },
            );
        }
        info!(
            "Managing {} cluster(s): {}",
            clusters.len(),
            clusters
                .keys()
                .map(ClusterName::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let pipeline = Arc::new(Pipeline {
            git,
            clusters,
            push_attempts: options.push_attempts.max(1),
            push_retry_delay: options.push_retry_delay,
        });

        let (events, batch_events) = mpsc::unbounded_channel();
        let converge = pipeline.clone();
        let publish = pipeline.clone();
        let batcher = Batcher::new(
            BatcherOptions::default()
                .max_queue_size(options.max_queue_size)
                .interval(options.batch_interval)
                .events(events)
                .pre_batch(move || {
                    let pipeline = converge.clone();
                    async move { pipeline.converge().await }
                })
                .post_batch(move || {
                    let pipeline = publish.clone();
                    async move { pipeline.publish().await }
                }),
        );

        let drain = batcher.start()?;
        let monitor = tokio::spawn(monitor_batches(batch_events));

        Ok(Self {
            pipeline,
            batcher,
            drain,
            monitor,
        })
    }

    pub fn clusters(&self) -> impl Iterator<Item = &ClusterName> {
        self.pipeline.clusters.keys()
    }

    pub fn manages(&self, cluster: &ClusterName) -> bool {
        self.pipeline.clusters.contains_key(cluster)
    }

    /// Stop accepting requests and wait for queued ones to finish.
    pub async fn shutdown(self) {
        let Self {
            batcher,
            drain,
            monitor,
            ..
        } = self;
        drop(batcher);
        if let Err(e) = drain.await {
            warn!("Batch loop ended abnormally: {e}");
        }
        if let Err(e) = monitor.await {
            warn!("Batch monitor ended abnormally: {e}");
        }
    }
}

async fn monitor_batches(mut events: mpsc::UnboundedReceiver<BatchEvent<ReleaseError>>) {
    while let Some(event) = events.recv().await {
        match event {
            BatchEvent::Done { processed } => info!("Batch done ({processed} request(s))"),
            BatchEvent::Failed(e) => error!("Batch error: {e}"),
        }
    }
}

#[async_trait]
impl ReleaseManager for BatchedReleaseManager {
    async fn request_release(&self, request: DeployRequest) -> Result<(), ReleaseError> {
        if !self.manages(&request.cluster) {
            return Err(ReleaseError::UnmanagedCluster(request.cluster.to_string()));
        }

        let (pending, synced) = PendingResult::new();
        let (committed_tx, committed) = oneshot::channel();
        let job = self.pipeline.clone().deploy_job(request, pending);

        self.batcher
            .queue(job, Some(committed_tx))
            .await
            .map_err(|e| ReleaseError::CommitFailed(e.to_string()))?;

        committed
            .await
            .map_err(|_| ReleaseError::CommitFailed("release pipeline stopped".to_string()))??;

        synced.await.map_err(|_| {
            ReleaseError::SyncFailed("release pipeline stopped before the cluster sync".to_string())
        })?
    }
}
