//! Fan-out broker - duplicate every transaction to all children

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::{MAsyncRx, MAsyncTx};
use futures::future::join_all;
use tokio::sync::Notify;

use sluice_component::{Error, Output, Result, SharedAck, Transaction};
use sluice_shutdown::Signaller;

use super::close_children;

/// Sends a copy of every transaction to each child output
///
/// Child sends run concurrently: the broker does not wait for child i to
/// accept before offering to child j. The upstream ack fires after all
/// children acked, or immediately with the first child error observed.
/// On drain the broker waits for every pending ack before closing its
/// children.
pub struct FanOutBroker {
    children: Arc<Vec<Box<dyn Output>>>,
    child_txs: Vec<MAsyncTx<Transaction>>,
    shut_sig: Signaller,
    started: bool,
}

impl FanOutBroker {
    /// Wire each child to its own edge
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
impl Output for FanOutBroker {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let child_txs = self.child_txs.clone();
        let children = Arc::clone(&self.children);
        let sig = self.shut_sig.clone();
        tokio::spawn(async move {
            let ack_pending = Arc::new(AtomicI64::new(0));
            let ack_drained = Arc::new(Notify::new());

            loop {
                let t = tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(t) => t,
                        Err(_) => break,
                    },
                    _ = sig.at_leisure_requested() => break,
                };

                let (batch, ack) = t.into_parts();

                // Wrap the upstream ack so the drain loop can observe when
                // every aggregate has resolved.
                ack_pending.fetch_add(1, Ordering::AcqRel);
                let pending = Arc::clone(&ack_pending);
                let drained = Arc::clone(&ack_drained);
                let counted: sluice_component::AckFn = Box::new(move |res| {
                    Box::pin(async move {
                        let out = ack(res).await;
                        pending.fetch_sub(1, Ordering::AcqRel);
                        drained.notify_waiters();
                        out
                    })
                });

                let shared = SharedAck::new(counted, child_txs.len());
                let sends = child_txs.iter().map(|child_tx| {
                    let copy = Transaction::new(batch.copy(), shared.derive());
                    async move {
                        if let Err(err) = child_tx.send(copy).await {
                            // Child edge gone: resolve this branch's share
                            // of the aggregate with an error.
                            let _ = err.0.ack(Err(Error::TypeClosed)).await;
                        }
                    }
                });

                tokio::select! {
                    _ = join_all(sends) => {}
                    _ = sig.now_requested() => break,
                }
            }

            // Drain pending acks before the children are told to close.
            while ack_pending.load(Ordering::Acquire) > 0 {
                tokio::select! {
                    _ = ack_drained.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                    _ = sig.now_requested() => break,
                }
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

#[cfg(test)]
#[path = "fan_out_test.rs"]
mod fan_out_test;
