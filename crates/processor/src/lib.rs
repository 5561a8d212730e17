//! Sluice - Processor
//!
//! The processor toolkit of the core:
//!
//! - [`PartProcessor`] and [`ForEachPart`]: lift a part-wise function into
//!   a batch processor. Dropped parts vanish, failed parts keep flowing
//!   with a failure annotation, outputs collect into a single batch.
//! - Error-branch processors: [`TryProcessor`], [`CatchProcessor`] and
//!   [`SwitchProcessor`] route on the per-part failure annotation instead
//!   of aborting batches.
//! - [`SplitProcessor`]: size-based re-batching with a sort group stamped
//!   on the source so acks can be reassembled.
//! - [`NoopProcessor`] and [`ResourceProcessor`] (delegates to a named
//!   processor through the resource manager).
//!
//! Failure handling follows one rule everywhere: per-part data errors are
//! annotations, not aborts. A processor returning `Err` fails the whole
//! transaction and is reserved for unrecoverable conditions.

mod branch;
mod noop;
mod part_wise;
mod resource;
mod split;

pub use branch::{CatchProcessor, SwitchCase, SwitchProcessor, TryProcessor};
pub use noop::NoopProcessor;
pub use part_wise::{for_each_part, ForEachPart, PartProcessor};
pub use resource::ResourceProcessor;
pub use split::SplitProcessor;
