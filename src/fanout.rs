// ABOUTME: Bounded-concurrency fan-out: run one executor call per argument, collect every failure.
// ABOUTME: Used to sync and diff many releases of a cluster without overwhelming helm.

use futures::stream::{self, StreamExt};
use std::fmt::Display;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    max_parallel: usize,
}

impl FanOut {
    /// At most `max_parallel` executor calls in flight. Zero means unlimited.
    pub fn new(max_parallel: usize) -> Self {
        Self { max_parallel }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run `executor` once per argument and wait for all of them.
    ///
    /// No call is cancelled when another fails; the returned list holds one
    /// error per failing call, in completion order.
    pub async fn run<A, E, F, Fut>(&self, args: Vec<A>, executor: F) -> Vec<E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let limit = match self.max_parallel {
            0 => args.len().max(1),
            n => n,
        };

        stream::iter(args)
            .map(executor)
            .buffer_unordered(limit)
            .filter_map(|result| async move { result.err() })
            .collect()
            .await
    }
}

/// One error message per line.
pub fn join_errors<E: Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn tracked(in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>, fail: bool) -> Result<(), String> {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        in_flight.fetch_sub(1, Ordering::SeqCst);
        if fail { Err("boom".to_string()) } else { Ok(()) }
    }

    async fn peak_for(fanout: FanOut, count: usize) -> usize {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let errors = fanout
            .run((0..count).collect(), |_| {
                tracked(in_flight.clone(), peak.clone(), false)
            })
            .await;
        assert!(errors.is_empty());
        peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn single_slot_runs_one_at_a_time() {
        assert_eq!(peak_for(FanOut::new(1), 5).await, 1);
    }

    #[tokio::test]
    async fn bound_caps_concurrency() {
        assert!(peak_for(FanOut::new(3), 10).await <= 3);
    }

    #[tokio::test]
    async fn unbounded_runs_everything_at_once() {
        assert_eq!(peak_for(FanOut::unbounded(), 6).await, 6);
    }

    #[tokio::test]
    async fn collects_every_failure() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let errors = FanOut::new(2)
            .run((0..7).collect(), |i: usize| {
                tracked(in_flight.clone(), peak.clone(), i % 2 == 0)
            })
            .await;
        assert_eq!(errors.len(), 4);
    }

    #[tokio::test]
    async fn empty_input_is_success() {
        let errors: Vec<String> = FanOut::new(4).run(Vec::<u8>::new(), |_| async { Ok(()) }).await;
        assert!(errors.is_empty());
    }

    #[test]
    fn joins_messages_per_line() {
        assert_eq!(join_errors(&["a failed", "b failed"]), "a failed\nb failed");
        assert_eq!(join_errors::<String>(&[]), "");
    }
}
