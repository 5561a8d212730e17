//! Drop output - discard and acknowledge

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;

use sluice_component::{Error, Output, Result, Transaction};
use sluice_shutdown::Signaller;

/// Discards every batch and acks success immediately
pub struct DropOutput {
    dropped: Arc<AtomicU64>,
    shut_sig: Signaller,
    started: bool,
}

impl DropOutput {
    pub fn new() -> Self {
        Self {
            dropped: Arc::new(AtomicU64::new(0)),
            shut_sig: Signaller::new(),
            started: false,
        }
    }

    /// Number of batches discarded so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for DropOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Output for DropOutput {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let dropped = Arc::clone(&self.dropped);
        let sig = self.shut_sig.clone();
        tokio::spawn(async move {
            loop {
                let t = tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(t) => t,
                        Err(_) => break,
                    },
                    _ = sig.at_leisure_requested() => break,
                };
                dropped.fetch_add(1, Ordering::Relaxed);
                let _ = t.ack(Ok(())).await;
            }
            tracing::debug!(
                dropped = dropped.load(Ordering::Relaxed),
                "drop output shutting down"
            );
            sig.shutdown_complete();
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        true
    }

    fn close_at_leisure(&self) {
        self.shut_sig.close_at_leisure();
    }

    fn close_now(&self) {
        self.shut_sig.close_now();
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        if self.shut_sig.wait_for_close(timeout).await {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}
