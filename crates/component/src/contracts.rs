//! Component capability contracts
//!
//! The small trait set the whole graph is assembled from. Inputs expose a
//! read-only edge of transactions, outputs bind an incoming edge, and both
//! honour the two-phase close protocol: `close_at_leisure` requests a
//! graceful drain, `close_now` an immediate stop, and `wait_for_close`
//! reflects real quiescence (it resolves only once the component's workers
//! have exited).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use crossfire::MAsyncRx;

use sluice_message::Batch;

use crate::{Result, Transaction};

/// A streamed source of transactions
#[async_trait]
pub trait Input: Send + Sync {
    /// A clone of the input's outgoing edge
    ///
    /// The edge closes once the input has no more data and its workers
    /// have exited.
    fn transaction_rx(&self) -> MAsyncRx<Transaction>;

    /// Whether the input is connected to its source
    fn connected(&self) -> bool;

    /// Request a graceful drain
    fn close_at_leisure(&self);

    /// Request an immediate stop
    fn close_now(&self);

    /// Wait until the input reports closed
    ///
    /// Returns [`crate::Error::Timeout`] if the deadline expires first. A
    /// zero timeout on an already-closed input returns `Ok(())`.
    async fn wait_for_close(&self, timeout: Duration) -> Result<()>;
}

/// A streamed sink of transactions
#[async_trait]
pub trait Output: Send + Sync {
    /// Bind the incoming edge and start processing
    ///
    /// Returns [`crate::Error::AlreadyStarted`] if called a second time.
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()>;

    /// Whether the output is connected to its sink
    fn connected(&self) -> bool;

    /// Request a graceful drain
    fn close_at_leisure(&self);

    /// Request an immediate stop
    fn close_now(&self);

    /// Wait until the output reports closed
    async fn wait_for_close(&self, timeout: Duration) -> Result<()>;
}

/// A batch processor
///
/// A processor may return zero batches (drop: the upstream is acked
/// successfully), one, or many (the upstream ack waits on all of them).
/// Per-part data errors should be recorded as failure annotations on the
/// parts rather than returned; a returned error fails the whole
/// transaction.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>>;

    /// Name of this processor for logging
    fn name(&self) -> &str;

    /// Release resources held by the processor during shutdown
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A key/value cache resource
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a key, `Ok(None)` when absent
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a key unconditionally
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Store a key only if absent, otherwise [`crate::Error::KeyAlreadyExists`]
    async fn add(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key, [`crate::Error::KeyNotFound`] when absent
    async fn delete(&self, key: &str) -> Result<()>;
}

/// A rate limit resource
#[async_trait]
pub trait RateLimit: Send + Sync {
    /// Request one unit of throughput
    ///
    /// Returns `Duration::ZERO` when the request is admitted, otherwise
    /// the period the caller should wait before retrying.
    async fn access(&self) -> Result<Duration>;
}
