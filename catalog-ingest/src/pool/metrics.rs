use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every worker of a pool.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    received: AtomicU64,
    indexed: AtomicU64,
    requeued: AtomicU64,
    dropped_invalid: AtomicU64,
    dropped_exhausted: AtomicU64,
    fallback_text: AtomicU64,
    fallback_image: AtomicU64,
    unrouted: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`], returned when a pool stops.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub received: u64,
    pub indexed: u64,
    pub requeued: u64,
    pub dropped_invalid: u64,
    pub dropped_exhausted: u64,
    /// Indexed records carrying a fallback text embedding.
    pub fallback_text: u64,
    /// Indexed records carrying a fallback image embedding.
    pub fallback_image: u64,
    /// Failed records that could not be written to the failure log and
    /// were left unacknowledged.
    pub unrouted: u64,
}

impl PipelineMetrics {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_indexed(&self, fallback_text: bool, fallback_image: bool) {
        self.indexed.fetch_add(1, Ordering::Relaxed);
        if fallback_text {
            self.fallback_text.fetch_add(1, Ordering::Relaxed);
        }
        if fallback_image {
            self.fallback_image.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_invalid(&self) {
        self.dropped_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_exhausted(&self) {
        self.dropped_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted(&self) {
        self.unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolReport {
        PoolReport {
            received: self.received.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            dropped_exhausted: self.dropped_exhausted.load(Ordering::Relaxed),
            fallback_text: self.fallback_text.load(Ordering::Relaxed),
            fallback_image: self.fallback_image.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
        }
    }
}
