//! Engine error vocabulary
//!
//! Every failure in the engine is a value: errors travel back up the graph
//! inside acknowledgement callbacks and out of constructors as `Result`s.
//! The sentinels here are the ones components surface at their boundaries.

use thiserror::Error;

use sluice_message::BatchError;

/// Errors surfaced by engine components
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The component lost (or never had) its connection; async writers
    /// respond by reconnecting with backoff and retrying
    #[error("not connected to target source or sink")]
    NotConnected,

    /// `consume` was called on an output that already has an edge bound
    #[error("component was already started")]
    AlreadyStarted,

    /// An action did not complete within its deadline
    #[error("action timed out")]
    Timeout,

    /// The component was closed while the action was in flight
    #[error("component was closed")]
    TypeClosed,

    /// A named pipe was not registered with the resource manager
    #[error("pipe was not found")]
    PipeNotFound,

    /// A named resource was not registered with the resource manager
    #[error("resource '{0}' was not found")]
    ResourceNotFound(String),

    /// A cache `add` targeted a key that already exists
    #[error("key already exists")]
    KeyAlreadyExists,

    /// A cache lookup targeted a missing key
    #[error("key does not exist")]
    KeyNotFound,

    /// Partial batch failure carrying per-index outcomes
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// An I/O failure, flattened to its message so errors stay cloneable
    /// through ack aggregation
    #[error("io error: {0}")]
    Io(String),

    /// Any other failure
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an arbitrary message as an engine error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for component operations
pub type Result<T> = std::result::Result<T, Error>;
