//! Inproc input - consume a named pipe from the resource manager

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;

use sluice_component::{Error, Input, Result, Transaction};
use sluice_manager::Manager;
use sluice_shutdown::Signaller;

/// How often an inproc input re-checks for its pipe to appear
const PIPE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reads transactions from a named in-process pipe
///
/// The matching inproc output may be built after this input, so the pipe
/// is polled until it appears. Transactions flow through whole, so acks
/// reach the original producer untouched.
pub struct InprocInput {
    rx: MAsyncRx<Transaction>,
    shut_sig: Signaller,
}

impl InprocInput {
    pub fn new(name: impl Into<String>, manager: Arc<Manager>) -> Self {
        let name = name.into();
        let (tx, rx) = sluice_component::edge();
        let shut_sig = Signaller::new();

        let sig = shut_sig.clone();
        tokio::spawn(async move {
            // Wait for the pipe to be registered.
            let pipe = loop {
                match manager.get_pipe(&name) {
                    Ok(pipe) => break Some(pipe),
                    Err(_) => {
                        tracing::debug!(pipe = %name, "pipe not yet registered, waiting");
                        tokio::select! {
                            _ = tokio::time::sleep(PIPE_POLL_INTERVAL) => {}
                            _ = sig.at_leisure_requested() => break None,
                        }
                    }
                }
            };

            if let Some(pipe) = pipe {
                tracing::info!(pipe = %name, "inproc input connected");
                loop {
                    let t = tokio::select! {
                        res = pipe.recv() => match res {
                            Ok(t) => t,
                            Err(_) => break,
                        },
                        _ = sig.at_leisure_requested() => break,
                    };
                    tokio::select! {
                        res = tx.send(t) => {
                            if let Err(err) = res {
                                let _ = err.0.ack(Err(Error::TypeClosed)).await;
                                break;
                            }
                        }
                        _ = sig.now_requested() => break,
                    }
                }
            }

            drop(tx);
            sig.shutdown_complete();
        });

        Self { rx, shut_sig }
    }
}

#[async_trait]
impl Input for InprocInput {
    fn transaction_rx(&self) -> MAsyncRx<Transaction> {
        self.rx.clone()
    }

    fn connected(&self) -> bool {
        !self.shut_sig.has_closed()
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
