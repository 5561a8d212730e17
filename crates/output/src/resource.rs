//! Resource output - forward to an output stored with the manager

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;

use sluice_component::{Error, Output, Result, Transaction};
use sluice_manager::Manager;
use sluice_shutdown::Signaller;

/// Delay before a transaction is retried when the resource is missing
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Forwards transactions to an output registered with the manager
///
/// The transaction crosses into the shared output whole, so its ack flows
/// from the shared component straight back upstream. When the resource is
/// temporarily absent (mid-reload) the transaction is held and retried.
#[derive(Debug)]
pub struct ResourceOutput {
    label: String,
    manager: Arc<Manager>,
    shut_sig: Signaller,
    started: bool,
}

impl ResourceOutput {
    /// Reference the output resource with the given label
    pub async fn new(label: impl Into<String>, manager: Arc<Manager>) -> Result<Self> {
        let label = label.into();
        if !manager.probe_output(&label).await {
            return Err(Error::ResourceNotFound(label));
        }
        Ok(Self {
            label,
            manager,
            shut_sig: Signaller::new(),
            started: false,
        })
    }
}

#[async_trait]
impl Output for ResourceOutput {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let label = self.label.clone();
        let manager = Arc::clone(&self.manager);
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

                let mut pending = Some(t);
                while let Some(t) = pending.take() {
                    match manager.write_to_output(&label, t).await {
                        Ok(()) => {}
                        Err((t, err)) => {
                            tracing::error!(
                                resource = %label,
                                error = %err,
                                "failed to reach output resource"
                            );
                            pending = Some(t);
                            tokio::select! {
                                _ = tokio::time::sleep(RETRY_DELAY) => {}
                                _ = sig.now_requested() => {
                                    if let Some(t) = pending.take() {
                                        let _ = t.ack(Err(Error::TypeClosed)).await;
                                    }
                                    break 'main;
                                }
                            }
                        }
                    }
                }
            }
            sig.shutdown_complete();
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        self.manager.output_connected(&self.label)
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
