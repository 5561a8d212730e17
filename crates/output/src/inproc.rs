//! Inproc output - publish the incoming edge as a named pipe

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;

use sluice_component::{Error, Output, Result, Transaction};
use sluice_manager::Manager;
use sluice_shutdown::Signaller;

/// Registers its incoming edge as a named pipe with the manager
///
/// An inproc input elsewhere in the process picks the pipe up and
/// consumes from it directly, so transactions (and their acks) cross the
/// pipe untouched. Until an input claims the pipe, back-pressure holds at
/// this output's edge.
pub struct InprocOutput {
    name: String,
    manager: Arc<Manager>,
    shut_sig: Signaller,
    started: bool,
}

impl InprocOutput {
    pub fn new(name: impl Into<String>, manager: Arc<Manager>) -> Self {
        Self {
            name: name.into(),
            manager,
            shut_sig: Signaller::new(),
            started: false,
        }
    }
}

#[async_trait]
impl Output for InprocOutput {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        self.manager.set_pipe(&self.name, rx);
        tracing::info!(pipe = %self.name, "inproc output registered pipe");
        Ok(())
    }

    fn connected(&self) -> bool {
        true
    }

    fn close_at_leisure(&self) {
        self.manager.unset_pipe(&self.name);
        self.shut_sig.close_at_leisure();
        self.shut_sig.shutdown_complete();
    }

    fn close_now(&self) {
        self.manager.unset_pipe(&self.name);
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
