//! Pipeline stage metrics
//!
//! Atomic counters shared by all workers of one stage. All operations use
//! relaxed ordering; values are eventually consistent, not real-time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a processor stage
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Transactions received from the upstream edge
    received: AtomicU64,

    /// Batches emitted downstream (splits count each derived batch)
    sent: AtomicU64,

    /// Transactions dropped because processors returned nothing
    dropped: AtomicU64,

    /// Transactions failed by a processor error
    errors: AtomicU64,

    /// Message parts entering the stage
    parts_received: AtomicU64,
}

impl PipelineMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            parts_received: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_received(&self, part_count: u64) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.parts_received.fetch_add(part_count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sent(&self, batches: u64) {
        self.sent.fetch_add(batches, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            parts_received: self.parts_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of stage metrics
#[derive(Debug, Clone, Copy)]
pub struct PipelineMetricsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub errors: u64,
    pub parts_received: u64,
}
