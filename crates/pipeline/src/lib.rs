//! Sluice - Pipeline
//!
//! The processor stage: T workers share the incoming edge, each applying
//! the ordered processor list to its transactions.
//!
//! # Ack discipline
//!
//! - Zero result batches: the upstream is acked successfully at once.
//! - One result batch: it travels onward carrying the upstream ack.
//! - Many result batches: a shared ack fires the upstream only after all
//!   of them resolved (first error wins).
//! - A processor returning an error fails that transaction upstream; the
//!   stage itself never drops messages.
//!
//! # Ordering
//!
//! Inside one worker, processors are strictly sequential and batches stay
//! in order. Across workers there is no order relation; configure one
//! thread where global order matters.

mod metrics;
mod stage;

pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};
pub use stage::Pipeline;
