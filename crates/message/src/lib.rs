//! Sluice - Message
//!
//! The data model that flows through the engine: message parts, batches and
//! batch-scoped errors.
//!
//! # Design
//!
//! - **Copy-on-write parts**: a [`MessagePart`] wraps its payload in
//!   `bytes::Bytes` and its metadata in an `Arc`, so cloning a part (or a
//!   whole batch, as brokers do for fan-out) is cheap and mutations of one
//!   copy never leak into another.
//! - **Lazy structured view**: the JSON value of a part is parsed on first
//!   access and cached until the payload is rewritten.
//! - **Sort groups**: [`SortGroup::stamp`] tags every part of a batch with
//!   its original position so that per-part outcomes can be reassembled
//!   after splits, filters and re-batching.
//! - **Batch errors**: [`BatchError`] carries per-index failures, enabling
//!   retries of only the failed subset of a batch.

mod batch;
mod error;
mod part;
mod sort_group;

pub use batch::Batch;
pub use error::BatchError;
pub use part::MessagePart;
pub use sort_group::SortGroup;
