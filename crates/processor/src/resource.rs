//! Resource processor - delegate to a named processor

use std::sync::Arc;

use async_trait::async_trait;

use sluice_component::{Processor, Result};
use sluice_manager::Manager;
use sluice_message::Batch;

/// Runs a processor registered with the resource manager by its label
///
/// The lookup happens per batch under the manager's read lock, so a
/// hot-reloaded replacement takes effect on the next batch.
#[derive(Debug)]
pub struct ResourceProcessor {
    label: String,
    manager: Arc<Manager>,
}

impl ResourceProcessor {
    /// Reference the processor resource with the given label
    ///
    /// Fails when no such resource exists at construction time.
    pub async fn new(label: impl Into<String>, manager: Arc<Manager>) -> Result<Self> {
        let label = label.into();
        if !manager.probe_processor(&label).await {
            return Err(sluice_component::Error::ResourceNotFound(label));
        }
        Ok(Self { label, manager })
    }
}

#[async_trait]
impl Processor for ResourceProcessor {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>> {
        self.manager
            .access_processor(&self.label, |p| async move { p.process(batch).await })
            .await?
    }

    fn name(&self) -> &str {
        "resource"
    }
}
