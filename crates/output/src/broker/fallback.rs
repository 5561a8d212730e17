//! Fallback broker - try children in priority order

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::{MAsyncRx, MAsyncTx};

use sluice_component::{Error, Output, Result, Transaction};
use sluice_shutdown::Signaller;

use super::close_children;

/// Attempts children in order until one succeeds
///
/// Each attempt sends a copy of the batch to the next child and waits for
/// that child's ack. The upstream ack carries success iff some child
/// succeeded, otherwise the final child's error.
pub struct FallbackBroker {
    children: Arc<Vec<Box<dyn Output>>>,
    child_txs: Vec<MAsyncTx<Transaction>>,
    shut_sig: Signaller,
    started: bool,
}

impl FallbackBroker {
    pub fn new(children: Vec<Box<dyn Output>>) -> Result<Self> {
        let mut children = children;
        let mut child_txs = Vec::with_capacity(children.len());
        for child in children.iter_mut() {
            let (tx, rx) = sluice_component::edge();
            child.consume(rx)?;
            child_txs.push(tx);
        }
        Ok(Self {
            children: Arc::new(children),
            child_txs,
            shut_sig: Signaller::new(),
            started: false,
        })
    }
}

#[async_trait]
impl Output for FallbackBroker {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let child_txs = self.child_txs.clone();
        let children = Arc::clone(&self.children);
        let sig = self.shut_sig.clone();
        tokio::spawn(async move {
            'main: loop {
                let t = tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(t) => t,
                        Err(_) => break,
                    },
                    _ = sig.at_leisure_requested() => break,
                };

                let (batch, ack) = t.into_parts();
                let mut last_err = Error::TypeClosed;

                for (index, child_tx) in child_txs.iter().enumerate() {
                    let (attempt, ack_rx) = Transaction::channel(batch.copy());
                    let send = tokio::select! {
                        res = child_tx.send(attempt) => res,
                        _ = sig.now_requested() => break 'main,
                    };
                    if send.is_err() {
                        last_err = Error::TypeClosed;
                        continue;
                    }

                    let outcome = tokio::select! {
                        res = ack_rx => res,
                        _ = sig.now_requested() => break 'main,
                    };
                    match outcome {
                        Ok(Ok(())) => {
                            let _ = ack(Ok(())).await;
                            continue 'main;
                        }
                        Ok(Err(err)) => {
                            tracing::warn!(
                                child = index,
                                error = %err,
                                "fallback child rejected batch, trying next"
                            );
                            last_err = err;
                        }
                        Err(_) => {
                            last_err = Error::TypeClosed;
                        }
                    }
                }

                let _ = ack(Err(last_err)).await;
            }

            drop(child_txs);
            close_children(&children).await;
            sig.shutdown_complete();
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        self.children.iter().all(|c| c.connected())
    }

    fn close_at_leisure(&self) {
        self.shut_sig.close_at_leisure();
    }

    fn close_now(&self) {
        self.shut_sig.close_now();
        for child in self.children.iter() {
            child.close_now();
        }
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        if self.shut_sig.wait_for_close(timeout).await {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}
