//! Part-wise processor adapter

use async_trait::async_trait;

use sluice_component::{Processor, Result};
use sluice_message::{Batch, MessagePart};

/// A processor that operates on one part at a time
///
/// Returning `Ok(None)` drops the part. Returning `Err` keeps the original
/// part with a failure annotation when run through [`ForEachPart`].
#[async_trait]
pub trait PartProcessor: Send + Sync {
    async fn process_part(&self, part: MessagePart) -> Result<Option<MessagePart>>;

    /// Name of this processor for logging
    fn name(&self) -> &str;
}

/// Adapter lifting a [`PartProcessor`] to the batch contract
///
/// Iterates the batch's parts in order, collects the outputs into a single
/// batch (preserving the batch's sort groups and each part's span), and
/// converts per-part errors into failure annotations so the batch keeps
/// flowing.
pub struct ForEachPart<P> {
    inner: P,
}

/// Wrap a part-wise processor for use in a pipeline
pub fn for_each_part<P: PartProcessor>(inner: P) -> ForEachPart<P> {
    ForEachPart { inner }
}

#[async_trait]
impl<P: PartProcessor> Processor for ForEachPart<P> {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let shell = batch.with_parts(Vec::new());
        let mut out = Vec::with_capacity(batch.len());

        for part in batch {
            let span = part.span().clone();
            let fallback = part.clone();
            match self.inner.process_part(part).await {
                Ok(Some(mut produced)) => {
                    produced.set_span(span);
                    out.push(produced);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(
                        processor = %self.inner.name(),
                        error = %err,
                        "part failed, annotating and continuing"
                    );
                    let mut failed = fallback;
                    failed.set_failed(err.to_string());
                    out.push(failed);
                }
            }
        }

        if out.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![shell.with_parts(out)])
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
#[path = "part_wise_test.rs"]
mod part_wise_test;
