// ABOUTME: Per-cluster registry of callers waiting for the outcome of the next push/sync cycle.
// ABOUTME: Broadcasts one result to every registered caller without ever blocking the broadcaster.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

/// Single-use handle for a caller's eventual result.
///
/// Delivery takes the sender, so a handle resolves at most once.
#[derive(Debug)]
pub struct PendingResult<E> {
    sender: Option<oneshot::Sender<Result<(), E>>>,
}

impl<E> PendingResult<E> {
    /// A handle plus the receiver its caller awaits.
    pub fn new() -> (Self, oneshot::Receiver<Result<(), E>>) {
        let (tx, rx) = oneshot::channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.is_none()
    }

    /// Deliver the result. Returns whether a listener received it.
    pub fn resolve(&mut self, result: Result<(), E>) -> bool {
        match self.sender.take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug)]
pub struct Waitlist<E> {
    entries: Mutex<Vec<PendingResult<E>>>,
}

impl<E> Default for Waitlist<E> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> Waitlist<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, pending: PendingResult<E>) {
        self.entries.lock().push(pending);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Signal success to every unresolved entry. Returns how many received it.
    pub fn all_done(&self) -> usize {
        self.broadcast(Ok(()))
    }

    /// Signal `err` to every unresolved entry. Returns how many received it.
    pub fn all_error(&self, err: E) -> usize {
        self.broadcast(Err(err))
    }

    /// Drop every entry. Receivers of unresolved entries observe a closed channel.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn broadcast(&self, result: Result<(), E>) -> usize {
        let mut entries = self.entries.lock();
        let mut delivered = 0;
        let mut abandoned = 0;

        for entry in entries.iter_mut().filter(|e| !e.is_resolved()) {
            if entry.resolve(result.clone()) {
                delivered += 1;
            } else {
                abandoned += 1;
            }
        }

        if abandoned > 0 {
            debug!("{abandoned} waiting caller(s) left before the result arrived");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Failed(&'static str);

    #[tokio::test]
    async fn all_done_reaches_every_waiter_and_keeps_entries_until_clear() {
        let waitlist = Waitlist::<Failed>::new();
        let (a, rx_a) = PendingResult::new();
        let (b, rx_b) = PendingResult::new();
        waitlist.add(a);
        waitlist.add(b);

        assert_eq!(waitlist.all_done(), 2);
        assert_eq!(rx_a.await.unwrap(), Ok(()));
        assert_eq!(rx_b.await.unwrap(), Ok(()));
        assert!(!waitlist.is_empty());

        waitlist.clear();
        assert!(waitlist.is_empty());
    }

    #[tokio::test]
    async fn all_error_carries_the_error() {
        let waitlist = Waitlist::new();
        let (a, rx_a) = PendingResult::new();
        waitlist.add(a);

        assert_eq!(waitlist.all_error(Failed("sync")), 1);
        assert_eq!(rx_a.await.unwrap(), Err(Failed("sync")));
    }

    #[test]
    fn entries_resolve_at_most_once() {
        let waitlist = Waitlist::<Failed>::new();
        let (a, mut rx_a) = PendingResult::new();
        waitlist.add(a);

        assert_eq!(waitlist.all_done(), 1);
        assert_eq!(waitlist.all_error(Failed("late")), 0);
        assert_eq!(rx_a.try_recv().unwrap(), Ok(()));
    }

    #[test]
    fn broadcast_skips_abandoned_waiters_without_blocking() {
        let waitlist = Waitlist::<Failed>::new();
        let (gone, rx) = PendingResult::new();
        drop(rx);
        waitlist.add(gone);
        let (live, _rx_live) = PendingResult::new();
        waitlist.add(live);

        assert_eq!(waitlist.len(), 2);
        assert_eq!(waitlist.all_done(), 1);
    }

    #[tokio::test]
    async fn clear_closes_unresolved_receivers() {
        let waitlist = Waitlist::<Failed>::new();
        let (a, rx_a) = PendingResult::new();
        waitlist.add(a);
        waitlist.clear();

        assert!(rx_a.await.is_err());
        assert_eq!(waitlist.all_done(), 0);
    }
}
