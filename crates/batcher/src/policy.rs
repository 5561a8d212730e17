//! Batching policy
//!
//! Accumulates message parts and reports when a configured trigger fires.
//! The caller owns the flush loop: `add` returns whether the batch should
//! flush immediately, and `until_next` exposes the period deadline for the
//! caller's timer.

use std::time::{Duration, Instant};

use sluice_message::{Batch, MessagePart};

/// Per-part predicate that forces a flush when it returns true
pub type CheckFn = Box<dyn Fn(&MessagePart) -> bool + Send + Sync>;

/// Batching triggers; any zero/unset trigger is disabled
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    /// Flush once this many parts have accumulated (0 disables)
    pub count: usize,

    /// Flush once this many payload bytes have accumulated (0 disables)
    pub byte_size: usize,

    /// Flush on a wall-clock interval
    pub period: Option<Duration>,
}

impl PolicyConfig {
    /// Whether no trigger is configured at all
    pub fn is_noop(&self) -> bool {
        self.count == 0 && self.byte_size == 0 && self.period.is_none()
    }
}

/// Stateful batching policy
pub struct Policy {
    conf: PolicyConfig,
    check: Option<CheckFn>,
    parts: Vec<MessagePart>,
    bytes: usize,
    triggered: bool,
    last_flush: Instant,
}

impl Policy {
    /// Create a policy from its trigger configuration
    pub fn new(conf: PolicyConfig) -> Self {
        Self {
            conf,
            check: None,
            parts: Vec::new(),
            bytes: 0,
            triggered: false,
            last_flush: Instant::now(),
        }
    }

    /// Attach a per-part flush predicate
    pub fn with_check(mut self, check: CheckFn) -> Self {
        self.check = Some(check);
        self
    }

    /// Add a part, returning whether the batch should flush now
    pub fn add(&mut self, part: MessagePart) -> bool {
        self.bytes += part.len();
        if let Some(check) = &self.check {
            if check(&part) {
                self.triggered = true;
            }
        }
        self.parts.push(part);

        self.triggered
            || (self.conf.count > 0 && self.parts.len() >= self.conf.count)
            || (self.conf.byte_size > 0 && self.bytes >= self.conf.byte_size)
    }

    /// Take the accumulated batch, if any, and reset the policy state
    pub fn flush(&mut self) -> Option<Batch> {
        self.last_flush = Instant::now();
        self.triggered = false;
        self.bytes = 0;
        if self.parts.is_empty() {
            return None;
        }
        Some(Batch::new(std::mem::take(&mut self.parts)))
    }

    /// Time remaining until the period trigger fires, if one is configured
    pub fn until_next(&self) -> Option<Duration> {
        self.conf
            .period
            .map(|p| p.saturating_sub(self.last_flush.elapsed()))
    }

    /// Number of accumulated parts
    #[inline]
    pub fn count(&self) -> usize {
        self.parts.len()
    }

    /// Whether nothing has accumulated
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod policy_test;
