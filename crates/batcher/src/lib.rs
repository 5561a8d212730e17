//! Sluice - Batcher
//!
//! The batching policy used by outputs (and embedders) to accumulate parts
//! until a trigger fires: a part count, a byte size, a wall-clock period,
//! or a per-part predicate.

mod policy;

pub use policy::{CheckFn, Policy, PolicyConfig};
