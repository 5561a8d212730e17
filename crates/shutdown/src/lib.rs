//! Sluice - Shutdown
//!
//! The shutdown vocabulary of the engine: a reusable signaller with two
//! escalation levels and a terminal state.
//!
//! - `close_at_leisure` requests a graceful drain.
//! - `close_now` requests an immediate stop (and implies at-leisure).
//! - `shutdown_complete` declares the component terminal and wakes waiters.
//!
//! Workers select on the signal futures alongside their channel work:
//!
//! ```ignore
//! tokio::select! {
//!     res = rx.recv() => { /* work */ }
//!     _ = sig.now_requested() => break,
//! }
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Two-phase close coordination primitive
///
/// Cloning produces a handle to the same underlying signals.
#[derive(Debug, Clone, Default)]
pub struct Signaller {
    at_leisure: CancellationToken,
    now: CancellationToken,
    closed: CancellationToken,
}

impl Signaller {
    /// Create a fresh signaller
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a graceful drain. Idempotent.
    pub fn close_at_leisure(&self) {
        self.at_leisure.cancel();
    }

    /// Request an immediate stop. Idempotent; implies at-leisure.
    pub fn close_now(&self) {
        self.at_leisure.cancel();
        self.now.cancel();
    }

    /// Declare shutdown terminal, waking all waiters. Idempotent.
    pub fn shutdown_complete(&self) {
        self.closed.cancel();
    }

    /// Resolves once a graceful drain has been requested
    pub async fn at_leisure_requested(&self) {
        self.at_leisure.cancelled().await
    }

    /// Resolves once an immediate stop has been requested
    pub async fn now_requested(&self) {
        self.now.cancelled().await
    }

    /// Resolves once the component has declared shutdown complete
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Whether a graceful drain has been requested
    pub fn should_close_at_leisure(&self) -> bool {
        self.at_leisure.is_cancelled()
    }

    /// Whether an immediate stop has been requested
    pub fn should_close_now(&self) -> bool {
        self.now.is_cancelled()
    }

    /// Whether shutdown has completed
    pub fn has_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait for shutdown to complete, bounded by `timeout`
    ///
    /// Returns `true` if the component closed in time. An already-closed
    /// signaller returns `true` even with a zero timeout.
    pub async fn wait_for_close(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.closed()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_escalation_levels() {
        let sig = Signaller::new();
        assert!(!sig.should_close_at_leisure());
        assert!(!sig.should_close_now());

        sig.close_at_leisure();
        assert!(sig.should_close_at_leisure());
        assert!(!sig.should_close_now());

        sig.close_now();
        assert!(sig.should_close_now());
    }

    #[tokio::test]
    async fn test_close_now_implies_at_leisure() {
        let sig = Signaller::new();
        sig.close_now();
        assert!(sig.should_close_at_leisure());
        sig.at_leisure_requested().await;
    }

    #[tokio::test]
    async fn test_wait_for_close_zero_timeout_when_closed() {
        let sig = Signaller::new();
        sig.shutdown_complete();
        assert!(sig.wait_for_close(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_wait_for_close_times_out() {
        let sig = Signaller::new();
        assert!(!sig.wait_for_close(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_complete_wakes_waiters() {
        let sig = Signaller::new();
        let waiter = {
            let sig = sig.clone();
            tokio::spawn(async move { sig.wait_for_close(Duration::from_secs(5)).await })
        };
        sig.shutdown_complete();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_idempotent_triggers() {
        let sig = Signaller::new();
        sig.close_at_leisure();
        sig.close_at_leisure();
        sig.close_now();
        sig.close_now();
        sig.shutdown_complete();
        sig.shutdown_complete();
        assert!(sig.has_closed());
    }
}
