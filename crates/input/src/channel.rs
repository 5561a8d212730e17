//! Channel-backed input
//!
//! Adapts a raw transaction edge into the input contract. Embedders and
//! tests hold the sender half and feed transactions directly; the input
//! closes once every sender has been dropped.

use std::time::Duration;

use async_trait::async_trait;
use crossfire::{MAsyncRx, MAsyncTx};

use sluice_component::{Error, Input, Result, Transaction};
use sluice_shutdown::Signaller;

/// Input fed through a plain transaction edge
pub struct ChannelInput {
    rx: MAsyncRx<Transaction>,
    shut_sig: Signaller,
}

impl ChannelInput {
    /// Create the input, returning the sender half of its edge
    pub fn new() -> (MAsyncTx<Transaction>, Self) {
        let (tx, rx) = sluice_component::edge();
        (
            tx,
            Self {
                rx,
                shut_sig: Signaller::new(),
            },
        )
    }

    /// Wrap an existing edge receiver
    pub fn from_rx(rx: MAsyncRx<Transaction>) -> Self {
        Self {
            rx,
            shut_sig: Signaller::new(),
        }
    }
}

#[async_trait]
impl Input for ChannelInput {
    fn transaction_rx(&self) -> MAsyncRx<Transaction> {
        self.rx.clone()
    }

    fn connected(&self) -> bool {
        !self.shut_sig.has_closed()
    }

    fn close_at_leisure(&self) {
        // No tasks to drain; the edge closes with its senders.
        self.shut_sig.close_at_leisure();
        self.shut_sig.shutdown_complete();
    }

    fn close_now(&self) {
        self.shut_sig.close_now();
        self.shut_sig.shutdown_complete();
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        if self.shut_sig.wait_for_close(timeout).await {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}
