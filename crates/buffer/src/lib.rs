//! Sluice - Buffer
//!
//! The optional decoupling queue between input and pipeline. The adapter
//! splits the end-to-end acknowledgement: the input is acked as soon as
//! the buffer accepts a batch, and deletion from the buffer is driven by
//! the ack of the fresh transaction emitted on the consumer side. This
//! decouples input and pipeline rates at the cost of widening the
//! at-least-once window (a crash between buffer-accept and buffer-delete
//! re-delivers).

mod adapter;
mod memory;

pub use adapter::BufferAdapter;
pub use memory::{MemoryBuffer, DEFAULT_LIMIT_BYTES};

use async_trait::async_trait;
use futures::future::BoxFuture;

use sluice_component::{AckResult, Result};
use sluice_message::Batch;

/// Deletion callback handed out with every read
///
/// Invoked with the downstream outcome: success deletes the batch from
/// the buffer, failure requeues it for re-delivery.
pub type CommitFn = Box<dyn FnOnce(AckResult) -> BoxFuture<'static, ()> + Send>;

/// A batch leased from a buffer together with its deletion callback
pub struct BufferedBatch {
    pub batch: Batch,
    pub commit: CommitFn,
}

impl std::fmt::Debug for BufferedBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedBatch")
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

/// The pluggable buffer contract
///
/// Writes block when the buffer is at capacity (back-pressure). Reads
/// block until a batch is available, and return
/// [`sluice_component::Error::TypeClosed`] once the writer has signalled
/// end-of-input and the buffer has drained.
#[async_trait]
pub trait BufferReaderWriter: Send + Sync {
    /// Store a batch, blocking while the buffer is full
    async fn write(&self, batch: Batch) -> Result<()>;

    /// Lease the next batch together with its deletion callback
    async fn read(&self) -> Result<BufferedBatch>;

    /// Signal that no further writes will arrive
    fn end_of_input(&self);

    /// Release the buffer's resources
    async fn close(&self) -> Result<()>;
}
