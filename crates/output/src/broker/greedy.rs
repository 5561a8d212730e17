//! Greedy broker - children race for transactions

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;

use sluice_component::{Error, Output, Result, Transaction};
use sluice_shutdown::Signaller;

/// Hands each transaction to whichever child is ready first
///
/// Every child consumes a clone of the broker's incoming edge, so the
/// channel itself arbitrates: a child busy writing leaves transactions
/// for its siblings. The winning child's ack is the upstream's ack.
pub struct GreedyBroker {
    children: Arc<Vec<Box<dyn Output>>>,
    shut_sig: Signaller,
    started: bool,
}

impl GreedyBroker {
    pub fn new(children: Vec<Box<dyn Output>>) -> Result<Self> {
        Ok(Self {
            children: Arc::new(children),
            shut_sig: Signaller::new(),
            started: false,
        })
    }
}

#[async_trait]
impl Output for GreedyBroker {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        // Children share the incoming edge directly. Mutable access is
        // safe here: consume holds &mut self and the children vector has
        // not been shared with any task yet.
        {
            let children = Arc::get_mut(&mut self.children)
                .expect("greedy children already shared before consume");
            for child in children.iter_mut() {
                child.consume(rx.clone())?;
            }
        }
        drop(rx);

        let children = Arc::clone(&self.children);
        let sig = self.shut_sig.clone();
        tokio::spawn(async move {
            // The shared edge closes upstream and each child drains it on
            // its own; wait for them to confirm, forcing only when an
            // immediate stop was requested.
            for (index, child) in children.iter().enumerate() {
                loop {
                    if child.wait_for_close(Duration::from_millis(500)).await.is_ok() {
                        break;
                    }
                    if sig.should_close_now() {
                        tracing::warn!(child = index, "greedy child forced to close");
                        child.close_now();
                        let _ = child.wait_for_close(super::CHILD_CLOSE_GRACE).await;
                        break;
                    }
                }
            }
            sig.shutdown_complete();
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        self.children.iter().all(|c| c.connected())
    }

    fn close_at_leisure(&self) {
        self.shut_sig.close_at_leisure();
        for child in self.children.iter() {
            child.close_at_leisure();
        }
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
