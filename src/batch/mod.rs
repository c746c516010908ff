// ABOUTME: Single-consumer batching work queue with lifecycle hooks and batch tainting.
// ABOUTME: Serializes every queued job through one drain loop driven by a fixed tick.

mod batcher;
mod options;

pub use batcher::{BatchAborted, BatchError, Batcher, JobReply};
pub use options::{
    BatchEvent, BatcherOptions, DEFAULT_INTERVAL, DEFAULT_MAX_QUEUE_SIZE, Hook, Job,
};
