//! Fan-in broker - multiplex N inputs onto one edge

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;

use sluice_component::{Error, Input, Result, Transaction};
use sluice_shutdown::Signaller;

/// Presents several child inputs as a single input
///
/// Transactions flow through whole, so each ack callback still reaches
/// the child that produced it. The merged edge closes once every child's
/// edge has closed and the children have confirmed shutdown.
pub struct FanInBroker {
    children: Arc<Vec<Box<dyn Input>>>,
    rx: MAsyncRx<Transaction>,
    shut_sig: Signaller,
}

/// How long the broker gives each child to confirm closure before it
/// escalates to a hard stop
const CHILD_CLOSE_GRACE: Duration = Duration::from_secs(5);

impl FanInBroker {
    pub fn new(children: Vec<Box<dyn Input>>) -> Self {
        let children = Arc::new(children);
        let (tx, rx) = sluice_component::edge();
        let shut_sig = Signaller::new();

        let mut forwarders = Vec::with_capacity(children.len());
        for child in children.iter() {
            let child_rx = child.transaction_rx();
            let tx = tx.clone();
            let sig = shut_sig.clone();
            forwarders.push(tokio::spawn(async move {
                loop {
                    let t = tokio::select! {
                        res = child_rx.recv() => match res {
                            Ok(t) => t,
                            Err(_) => break,
                        },
                        _ = sig.now_requested() => break,
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
            }));
        }
        drop(tx);

        let sig = shut_sig.clone();
        let supervised = Arc::clone(&children);
        tokio::spawn(async move {
            for forwarder in forwarders {
                let _ = forwarder.await;
            }
            for (index, child) in supervised.iter().enumerate() {
                child.close_at_leisure();
                if child.wait_for_close(CHILD_CLOSE_GRACE).await.is_err() {
                    tracing::warn!(child = index, "fan-in child failed to close, forcing");
                    child.close_now();
                    let _ = child.wait_for_close(CHILD_CLOSE_GRACE).await;
                }
            }
            sig.shutdown_complete();
        });

        Self {
            children,
            rx,
            shut_sig,
        }
    }
}

#[async_trait]
impl Input for FanInBroker {
    fn transaction_rx(&self) -> MAsyncRx<Transaction> {
        self.rx.clone()
    }

    fn connected(&self) -> bool {
        self.children.iter().all(|c| c.connected())
    }

    fn close_at_leisure(&self) {
        for child in self.children.iter() {
            child.close_at_leisure();
        }
        self.shut_sig.close_at_leisure();
    }

    fn close_now(&self) {
        for child in self.children.iter() {
            child.close_now();
        }
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

#[cfg(test)]
#[path = "fan_in_test.rs"]
mod fan_in_test;
