//! Observability: worker counters and tracing setup

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Ignore a second initialisation (tests, embedding applications).
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counters for the download worker
#[derive(Debug, Default)]
pub struct Metrics {
    submitted: AtomicU64,
    cancelled: AtomicU64,
    cleared: AtomicU64,
    fetched: AtomicU64,
    fetch_failed: AtomicU64,
    decode_failed: AtomicU64,
    delivered: AtomicU64,
    discarded_stale: AtomicU64,
    discarded_stopped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = name, "Metric incremented");
    }

    pub fn submitted(&self) {
        Self::increment(&self.submitted, "submitted");
    }

    pub fn cancelled(&self) {
        Self::increment(&self.cancelled, "cancelled");
    }

    pub fn cleared(&self) {
        Self::increment(&self.cleared, "cleared");
    }

    pub fn fetched(&self) {
        Self::increment(&self.fetched, "fetched");
    }

    pub fn fetch_failed(&self) {
        Self::increment(&self.fetch_failed, "fetch_failed");
    }

    pub fn decode_failed(&self) {
        Self::increment(&self.decode_failed, "decode_failed");
    }

    pub fn delivered(&self) {
        Self::increment(&self.delivered, "delivered");
    }

    pub fn discarded_stale(&self) {
        Self::increment(&self.discarded_stale, "discarded_stale");
    }

    pub fn discarded_stopped(&self) {
        Self::increment(&self.discarded_stopped, "discarded_stopped");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            fetch_failed: self.fetch_failed.load(Ordering::Relaxed),
            decode_failed: self.decode_failed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            discarded_stale: self.discarded_stale.load(Ordering::Relaxed),
            discarded_stopped: self.discarded_stopped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub cancelled: u64,
    pub cleared: u64,
    pub fetched: u64,
    pub fetch_failed: u64,
    pub decode_failed: u64,
    pub delivered: u64,
    pub discarded_stale: u64,
    pub discarded_stopped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.submitted();
        metrics.submitted();
        metrics.delivered();
        metrics.discarded_stale();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.submitted, 2);
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.discarded_stale, 1);
        assert_eq!(snapshot.fetch_failed, 0);
    }
}
