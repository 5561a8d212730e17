//! Resource input - share an input registered with the manager

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;

use sluice_component::{Error, Input, Result, Transaction};
use sluice_manager::Manager;
use sluice_shutdown::Signaller;

/// References an input stored as a named resource
///
/// Several resource inputs may reference one stored input; each clone of
/// the shared edge competes for transactions, so the stored input's data
/// is divided between its references. Closing a resource input never
/// closes the underlying resource; the manager owns that lifecycle.
pub struct ResourceInput {
    label: String,
    manager: Arc<Manager>,
    rx: MAsyncRx<Transaction>,
    shut_sig: Signaller,
}

impl ResourceInput {
    /// Reference the input resource with the given label
    pub async fn new(label: impl Into<String>, manager: Arc<Manager>) -> Result<Self> {
        let label = label.into();
        let rx = manager.input_rx(&label).await?;
        Ok(Self {
            label,
            manager,
            rx,
            shut_sig: Signaller::new(),
        })
    }
}

#[async_trait]
impl Input for ResourceInput {
    fn transaction_rx(&self) -> MAsyncRx<Transaction> {
        self.rx.clone()
    }

    fn connected(&self) -> bool {
        self.manager.input_connected(&self.label)
    }

    fn close_at_leisure(&self) {
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
