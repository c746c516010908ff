// ABOUTME: Batcher configuration: lifecycle hooks, batch event channel, queue bound, tick interval.
// ABOUTME: Hooks are async closures; each is optional and each may fail.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Queue capacity used when none is configured.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 20;

/// How often the drain loop checks the queue.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// A queued unit of work.
pub type Job<E> = BoxFuture<'static, Result<(), E>>;

/// A batch or item lifecycle hook.
pub type Hook<E> = Arc<dyn Fn() -> BoxFuture<'static, Result<(), E>> + Send + Sync>;

/// Batch-level outcome, delivered once per drained batch.
#[derive(Debug)]
pub enum BatchEvent<E> {
    /// Every hook succeeded. Individual jobs may still have failed.
    Done { processed: usize },
    /// PreBatch or PostBatch failed.
    Failed(E),
}

pub struct BatcherOptions<E> {
    /// Runs before any item of a batch. Failure taints the batch.
    pub pre_batch: Option<Hook<E>>,
    /// Runs once after every item of an untainted batch.
    pub post_batch: Option<Hook<E>>,
    /// Runs before each job. Failure skips the job and `post_item`.
    pub pre_item: Option<Hook<E>>,
    /// Runs after each successful job.
    pub post_item: Option<Hook<E>>,
    pub events: Option<UnboundedSender<BatchEvent<E>>>,
    pub max_queue_size: usize,
    pub interval: Duration,
}

impl<E> Default for BatcherOptions<E> {
    fn default() -> Self {
        Self {
            pre_batch: None,
            post_batch: None,
            pre_item: None,
            post_item: None,
            events: None,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl<E: 'static> BatcherOptions<E> {
    pub fn pre_batch<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.pre_batch = Some(boxed_hook(hook));
        self
    }

    pub fn post_batch<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.post_batch = Some(boxed_hook(hook));
        self
    }

    pub fn pre_item<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.pre_item = Some(boxed_hook(hook));
        self
    }

    pub fn post_item<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.post_item = Some(boxed_hook(hook));
        self
    }

    pub fn events(mut self, events: UnboundedSender<BatchEvent<E>>) -> Self {
        self.events = Some(events);
        self
    }

    /// Zero falls back to [`DEFAULT_MAX_QUEUE_SIZE`].
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = if size == 0 {
            DEFAULT_MAX_QUEUE_SIZE
        } else {
            size
        };
        self
    }

    /// Zero falls back to [`DEFAULT_INTERVAL`].
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };
        self
    }
}

fn boxed_hook<E, F, Fut>(hook: F) -> Hook<E>
where
    E: 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    Arc::new(move || hook().boxed())
}
