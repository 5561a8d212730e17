//! Sluice - Output
//!
//! The output side of the graph:
//!
//! - [`AsyncWriter`]: lifts a single-connection [`Writer`] driver into a
//!   bounded-parallel, auto-reconnecting, back-pressure-aware output.
//! - The broker family: [`FanOutBroker`], [`RoundRobinBroker`],
//!   [`GreedyBroker`] and [`FallbackBroker`] compose N child outputs into
//!   one while aggregating acknowledgements correctly.
//! - [`BatchingOutput`]: accumulates incoming transactions under a
//!   batching policy before handing merged batches to an inner output.
//! - Utility outputs: [`StdoutOutput`] (a `Writer`), [`DropOutput`],
//!   [`InprocOutput`] and [`ResourceOutput`].

mod backoff;
mod batching;
mod broker;
mod drop;
mod inproc;
mod resource;
mod stdout;
mod writer;

pub use backoff::{Backoff, BackoffConfig};
pub use batching::BatchingOutput;
pub use broker::{FallbackBroker, FanOutBroker, GreedyBroker, RoundRobinBroker};
pub use drop::DropOutput;
pub use inproc::InprocOutput;
pub use resource::ResourceOutput;
pub use stdout::{StdoutOutput, StdoutWriter};
pub use writer::{AsyncWriter, Writer, WriterConfig, WriterMetrics, WriterMetricsSnapshot};

#[cfg(test)]
pub(crate) mod testutil;
