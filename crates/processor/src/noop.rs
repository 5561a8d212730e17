//! Pass-through processor

use async_trait::async_trait;

use sluice_component::{Processor, Result};
use sluice_message::Batch;

/// Forwards batches unchanged
#[derive(Debug, Default)]
pub struct NoopProcessor;

#[async_trait]
impl Processor for NoopProcessor {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![batch])
    }

    fn name(&self) -> &str {
        "noop"
    }
}
