//! Batching output - accumulate transactions under a policy
//!
//! Merges the parts of incoming transactions until the batching policy
//! triggers, then hands one combined batch to the inner output. The inner
//! output's ack is replayed to every source transaction that contributed
//! to the flush.

use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;

use sluice_batcher::Policy;
use sluice_component::{combine_acks, AckFn, Error, Output, Result, Transaction};
use sluice_shutdown::Signaller;

/// Policy-driven batching wrapper around an inner output
pub struct BatchingOutput {
    inner_tx: crossfire::MAsyncTx<Transaction>,
    inner: Box<dyn Output>,
    policy: Option<Policy>,
    shut_sig: Signaller,
    started: bool,
}

impl BatchingOutput {
    /// Wrap `inner`, flushing according to `policy`
    pub fn new(mut inner: Box<dyn Output>, policy: Policy) -> Result<Self> {
        let (inner_tx, inner_rx) = sluice_component::edge();
        inner.consume(inner_rx)?;
        Ok(Self {
            inner_tx,
            inner,
            policy: Some(policy),
            shut_sig: Signaller::new(),
            started: false,
        })
    }
}

#[async_trait]
impl Output for BatchingOutput {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let mut policy = self.policy.take().expect("policy consumed twice");
        let inner_tx = self.inner_tx.clone();
        let sig = self.shut_sig.clone();
        tokio::spawn(async move {
            let mut pending_acks: Vec<AckFn> = Vec::new();

            'main: loop {
                eprintln!("BATCH TASK: loop iter");
                let period = async {
                    match policy.until_next() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => std::future::pending().await,
                    }
                };

                let mut flush = false;
                let mut closed = false;
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(t) => {
                            let (batch, ack) = t.into_parts();
                            pending_acks.push(ack);
                            for part in batch {
                                if policy.add(part) {
                                    flush = true;
                                }
                            }
                        }
                        Err(_) => {
                            flush = true;
                            closed = true;
                        }
                    },
                    _ = period => flush = true,
                    _ = sig.now_requested() => {
                        // Abandon the partial batch, failing its sources.
                        let acks = std::mem::take(&mut pending_acks);
                        if !acks.is_empty() {
                            let _ = combine_acks(acks)(Err(Error::TypeClosed)).await;
                        }
                        break 'main;
                    }
                }

                if flush {
                    if let Some(batch) = policy.flush() {
                        let acks = std::mem::take(&mut pending_acks);
                        let t = Transaction::new(batch, combine_acks(acks));
                        tokio::select! {
                            res = inner_tx.send(t) => {
                                if let Err(err) = res {
                                    let _ = err.0.ack(Err(Error::TypeClosed)).await;
                                    break 'main;
                                }
                            }
                            _ = sig.now_requested() => break 'main,
                        }
                    }
                }
                if closed {
                    break;
                }
            }

            eprintln!("BATCH TASK: about to complete");
            drop(inner_tx);
            sig.shutdown_complete();
            eprintln!("BATCH TASK: completed");
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        self.inner.connected()
    }

    fn close_at_leisure(&self) {
        self.shut_sig.close_at_leisure();
        self.inner.close_at_leisure();
    }

    fn close_now(&self) {
        self.shut_sig.close_now();
        self.inner.close_now();
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        if !self.shut_sig.wait_for_close(timeout).await {
            return Err(Error::Timeout);
        }
        self.inner.wait_for_close(timeout).await
    }
}

#[cfg(test)]
#[path = "batching_test.rs"]
mod batching_test;
