//! Split processor - size-based re-batching

use async_trait::async_trait;

use sluice_component::{Processor, Result};
use sluice_message::{Batch, SortGroup};

/// Breaks a batch into chunks of at most `size` parts
///
/// A sort group is stamped on the source batch before splitting so that
/// downstream components can reassemble per-part outcomes; the upstream
/// ack completes only once every derived batch has been acked.
#[derive(Debug)]
pub struct SplitProcessor {
    size: usize,
}

impl SplitProcessor {
    /// Split into batches of at most `size` parts (minimum one)
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

#[async_trait]
impl Processor for SplitProcessor {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = batch;
        let _group = SortGroup::stamp(&mut batch);

        let shell = batch.with_parts(Vec::new());
        let parts = batch.into_parts();

        let mut out = Vec::with_capacity(parts.len().div_ceil(self.size));
        let mut chunk = Vec::with_capacity(self.size.min(parts.len()));
        for part in parts {
            chunk.push(part);
            if chunk.len() == self.size {
                out.push(shell.with_parts(std::mem::take(&mut chunk)));
            }
        }
        if !chunk.is_empty() {
            out.push(shell.with_parts(chunk));
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "split"
    }
}
