//! Statistics collection for a running copy

use dagcopy_types::CopyStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Lock-free counters shared by every worker of one copy
#[derive(Debug)]
pub struct StatisticsCollector {
    nodes_copied: AtomicU64,
    nodes_skipped: AtomicU64,
    bytes_copied: AtomicU64,
    started: Instant,
}

impl StatisticsCollector {
    /// Start collecting; the duration is measured from now
    pub fn new() -> Self {
        Self {
            nodes_copied: AtomicU64::new(0),
            nodes_skipped: AtomicU64::new(0),
            bytes_copied: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record a node pushed to the destination
    pub fn record_copied(&self, bytes: u64) {
        self.nodes_copied.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a node found already present at the destination
    pub fn record_skipped(&self) {
        self.nodes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters
    pub fn snapshot(&self) -> CopyStats {
        CopyStats {
            nodes_copied: self.nodes_copied.load(Ordering::Relaxed),
            nodes_skipped: self.nodes_skipped.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            duration: self.started.elapsed(),
        }
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters() {
        let stats = StatisticsCollector::new();
        stats.record_copied(100);
        stats.record_copied(23);
        stats.record_skipped();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.nodes_copied, 2);
        assert_eq!(snapshot.nodes_skipped, 1);
        assert_eq!(snapshot.bytes_copied, 123);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording() {
        let stats = Arc::new(StatisticsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        stats.record_copied(2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.nodes_copied, 800);
        assert_eq!(snapshot.bytes_copied, 1600);
    }
}
