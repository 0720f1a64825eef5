//! Commit tracking: exactly one owner per digest
//!
//! Every node of the copied graph may be reached through several parents at
//! the same time. The [`Tracker`] lets the first worker that reaches a digest
//! own it; everyone else gets the owner's [`Completion`] and waits on it
//! instead of repeating the work.

use dagcopy_types::{Descriptor, Digest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// One-shot broadcast readiness signal.
///
/// Signalling is idempotent and every current or future waiter observes it.
#[derive(Debug)]
pub struct Completion {
    done: watch::Sender<bool>,
}

impl Completion {
    fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self { done }
    }

    /// Mark the node as done, waking all waiters
    pub fn signal(&self) {
        self.done.send_replace(true);
    }

    /// Whether the node is done
    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait until the node is done. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut done = self.done.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let _ = done.wait_for(|done| *done).await;
    }
}

/// In-memory registry arbitrating node ownership
#[derive(Debug, Default)]
pub struct Tracker {
    status: Mutex<HashMap<Digest, Arc<Completion>>>,
}

impl Tracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to become the owner of `desc`.
    ///
    /// Returns the digest's completion signal and `true` for the first caller,
    /// which must eventually [`Completion::signal`] it. Every later caller
    /// gets the same signal and `false`.
    pub fn try_commit(&self, desc: &Descriptor) -> (Arc<Completion>, bool) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(done) = status.get(&desc.digest) {
            return (Arc::clone(done), false);
        }
        let done = Arc::new(Completion::new());
        status.insert(desc.digest.clone(), Arc::clone(&done));
        (done, true)
    }

    /// Completion signal of an already committed node
    pub fn get(&self, desc: &Descriptor) -> Option<Arc<Completion>> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&desc.digest)
            .cloned()
    }

    /// Number of committed digests
    pub fn len(&self) -> usize {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was committed yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagcopy_types::media_type;
    use std::time::Duration;

    fn desc(data: &[u8]) -> Descriptor {
        Descriptor::from_bytes(media_type::OCI_LAYER_GZIP, data)
    }

    #[test]
    fn test_first_commit_wins() {
        let tracker = Tracker::new();
        let layer = desc(b"layer");

        let (owner, committed) = tracker.try_commit(&layer);
        assert!(committed);
        let (other, committed) = tracker.try_commit(&layer);
        assert!(!committed);
        assert!(Arc::ptr_eq(&owner, &other));

        let (_, committed) = tracker.try_commit(&desc(b"other"));
        assert!(committed);
        assert_eq!(tracker.len(), 2);

        assert!(Arc::ptr_eq(&tracker.get(&layer).unwrap(), &owner));
        assert!(tracker.get(&desc(b"unknown")).is_none());
    }

    #[tokio::test]
    async fn test_signal_reaches_current_and_future_waiters() {
        let tracker = Tracker::new();
        let layer = desc(b"layer");
        let (done, _) = tracker.try_commit(&layer);

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let (done, committed) = tracker.try_commit(&layer);
                assert!(!committed);
                tokio::spawn(async move { done.wait().await })
            })
            .collect();

        assert!(!done.is_done());
        done.signal();
        done.signal();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }

        // late waiters do not block
        let (late, _) = tracker.try_commit(&layer);
        tokio::time::timeout(Duration::from_millis(100), late.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unsignalled_completion_blocks() {
        let tracker = Tracker::new();
        let (done, _) = tracker.try_commit(&desc(b"failing"));
        let waited = tokio::time::timeout(Duration::from_millis(50), done.wait()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commit_has_single_winner() {
        let tracker = Arc::new(Tracker::new());
        let layer = desc(b"contended");

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let layer = layer.clone();
                tokio::spawn(async move { tracker.try_commit(&layer).1 })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
