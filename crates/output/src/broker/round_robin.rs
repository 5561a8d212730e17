//! Round-robin broker - cycle transactions across children

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::{MAsyncRx, MAsyncTx};

use sluice_component::{Error, Output, Result, Transaction};
use sluice_shutdown::Signaller;

use super::close_children;

/// Forwards each transaction to exactly one child, cycling by index
///
/// The child's ack is the upstream's ack; the broker adds nothing to the
/// aggregation path.
pub struct RoundRobinBroker {
    children: Arc<Vec<Box<dyn Output>>>,
    child_txs: Vec<MAsyncTx<Transaction>>,
    shut_sig: Signaller,
    started: bool,
}

impl RoundRobinBroker {
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
impl Output for RoundRobinBroker {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let child_txs = self.child_txs.clone();
        let children = Arc::clone(&self.children);
        let sig = self.shut_sig.clone();
        tokio::spawn(async move {
            let mut target = 0usize;
            loop {
                let t = tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(t) => t,
                        Err(_) => break,
                    },
                    _ = sig.at_leisure_requested() => break,
                };

                let child_tx = &child_txs[target];
                target = (target + 1) % child_txs.len();

                tokio::select! {
                    res = child_tx.send(t) => {
                        if let Err(err) = res {
                            let _ = err.0.ack(Err(Error::TypeClosed)).await;
                            break;
                        }
                    }
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
