// ABOUTME: Batcher queue plus its drain loop: snapshot the queue each tick, run hooks and jobs in order.
// ABOUTME: A failed pre-batch hook taints the batch; tainted jobs are failed without running.

use super::options::{BatchEvent, BatcherOptions, Job};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Where a queued job's own result is delivered.
pub type JobReply<E> = oneshot::Sender<Result<(), E>>;

/// Result given to jobs that were skipped because their batch was tainted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot process request: an earlier step of this batch failed")]
pub struct BatchAborted;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("batcher is no longer accepting jobs")]
    Closed,

    #[error("batcher was already started")]
    AlreadyStarted,
}

struct QueuedJob<E> {
    job: Job<E>,
    reply: Option<JobReply<E>>,
}

/// Bounded FIFO of jobs consumed by a single drain loop.
///
/// `queue` suspends the producer while the queue is full. Nothing is
/// consumed until [`Batcher::start`] spawns the drain loop.
pub struct Batcher<E> {
    sender: mpsc::Sender<QueuedJob<E>>,
    drain: Mutex<Option<DrainLoop<E>>>,
}

impl<E> Batcher<E>
where
    E: std::error::Error + From<BatchAborted> + Send + 'static,
{
    pub fn new(options: BatcherOptions<E>) -> Self {
        let (sender, receiver) = mpsc::channel(options.max_queue_size.max(1));
        Self {
            sender,
            drain: Mutex::new(Some(DrainLoop { receiver, options })),
        }
    }

    /// Enqueue a job, waiting for room if the queue is full.
    pub async fn queue(&self, job: Job<E>, reply: Option<JobReply<E>>) -> Result<(), BatchError> {
        self.sender
            .send(QueuedJob { job, reply })
            .await
            .map_err(|_| BatchError::Closed)
    }

    /// Spawn the drain loop. Only the first call succeeds.
    pub fn start(&self) -> Result<JoinHandle<()>, BatchError> {
        let drain = self.drain.lock().take().ok_or(BatchError::AlreadyStarted)?;
        Ok(tokio::spawn(drain.run()))
    }

    /// Jobs currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

struct DrainLoop<E> {
    receiver: mpsc::Receiver<QueuedJob<E>>,
    options: BatcherOptions<E>,
}

impl<E> DrainLoop<E>
where
    E: std::error::Error + From<BatchAborted> + Send + 'static,
{
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if self.receiver.is_empty() {
                if self.receiver.is_closed() {
                    debug!("Batch queue closed, stopping drain loop");
                    break;
                }
                continue;
            }

            self.process_batch().await;
        }
    }

    async fn process_batch(&mut self) {
        let Self { receiver, options } = self;

        // Jobs queued while this batch runs wait for the next tick
        let size = receiver.len();
        debug!("Processing batch of {size} job(s)");

        let mut tainted = false;
        if let Some(hook) = &options.pre_batch
            && let Err(e) = hook().await
        {
            warn!("Pre-batch step failed, aborting batch: {e}");
            signal_batch(options, BatchEvent::Failed(e));
            tainted = true;
        }

        for _ in 0..size {
            let Ok(QueuedJob { job, reply }) = receiver.try_recv() else {
                break;
            };

            if tainted {
                reply_to(reply, Err(E::from(BatchAborted)));
                continue;
            }

            let result = run_job(options, job).await;
            if let Err(e) = &result {
                warn!("Batched job failed: {e}");
            }
            reply_to(reply, result);
        }

        if tainted {
            return;
        }

        if let Some(hook) = &options.post_batch
            && let Err(e) = hook().await
        {
            warn!("Post-batch step failed: {e}");
            signal_batch(options, BatchEvent::Failed(e));
            return;
        }

        debug!("Batch of {size} job(s) done");
        signal_batch(options, BatchEvent::Done { processed: size });
    }
}

async fn run_job<E>(options: &BatcherOptions<E>, job: Job<E>) -> Result<(), E> {
    if let Some(hook) = &options.pre_item {
        hook().await?;
    }
    job.await?;
    if let Some(hook) = &options.post_item {
        hook().await?;
    }
    Ok(())
}

fn reply_to<E>(reply: Option<JobReply<E>>, result: Result<(), E>) {
    if let Some(reply) = reply
        && reply.send(result).is_err()
    {
        debug!("Job submitter went away before its result was delivered");
    }
}

fn signal_batch<E>(options: &BatcherOptions<E>, event: BatchEvent<E>) {
    if let Some(events) = &options.events
        && events.send(event).is_err()
    {
        debug!("No listener for batch events");
    }
}
