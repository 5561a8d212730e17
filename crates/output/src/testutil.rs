//! Test support for output components

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;
use tokio::sync::mpsc;

use sluice_component::{Error, Output, Result, Transaction};
use sluice_shutdown::Signaller;

/// Output that forwards every received transaction to the test
///
/// The test receives the transactions through an unbounded channel and
/// decides when (and how) to ack them.
pub struct CapturedOutput {
    captured: mpsc::UnboundedSender<Transaction>,
    connected: Arc<AtomicBool>,
    shut_sig: Signaller,
    started: bool,
}

impl CapturedOutput {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Transaction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                captured: tx,
                connected: Arc::new(AtomicBool::new(true)),
                shut_sig: Signaller::new(),
                started: false,
            },
            rx,
        )
    }
}

#[async_trait]
impl Output for CapturedOutput {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let captured = self.captured.clone();
        let sig = self.shut_sig.clone();
        tokio::spawn(async move {
            loop {
                let t = tokio::select! {
                    res = rx.recv() => match res {
                        Ok(t) => t,
                        Err(_) => break,
                    },
                    _ = sig.now_requested() => break,
                };
                if captured.send(t).is_err() {
                    break;
                }
            }
            sig.shutdown_complete();
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
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
