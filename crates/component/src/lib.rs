//! Sluice - Component
//!
//! The runtime contracts every component in the engine speaks:
//!
//! - [`Transaction`]: the only currency on graph edges, pairing a batch
//!   with a single-shot acknowledgement callback.
//! - [`SharedAck`]: closure-based ack aggregation for brokers and split
//!   processors (derived acks decrement a counter; the parent fires once).
//! - [`Error`]: the engine error vocabulary, including the sentinels
//!   surfaced at component boundaries.
//! - The capability traits: [`Input`], [`Output`], [`Processor`],
//!   [`Cache`] and [`RateLimit`].
//!
//! Graph edges are bounded `crossfire` MPMC channels of transactions with
//! capacity one, so back-pressure propagates immediately from the slowest
//! consumer to the producer. The MPMC receiver clones let several workers
//! share one edge.

mod contracts;
mod error;
mod transaction;

pub use contracts::{Cache, Input, Output, Processor, RateLimit};
pub use error::{Error, Result};
pub use transaction::{combine_acks, AckFn, AckFuture, AckResult, SharedAck, Transaction};

use crossfire::{MAsyncRx, MAsyncTx};

/// Capacity of every inter-component transaction edge
///
/// A single slot keeps edges as close to rendezvous channels as the
/// runtime allows: a producer can stage at most one transaction ahead of
/// the consumer before it blocks.
pub const EDGE_CAPACITY: usize = 1;

/// Create a transaction edge between two components
pub fn edge() -> (MAsyncTx<Transaction>, MAsyncRx<Transaction>) {
    crossfire::mpmc::bounded_async(EDGE_CAPACITY)
}
