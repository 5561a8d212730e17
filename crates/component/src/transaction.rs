//! Transaction - The unit of flow on every graph edge
//!
//! A transaction pairs a batch with a single-shot acknowledgement callback.
//! Exactly one ack must be delivered per transaction: `Ok(())` signals
//! success, an error signals a (possibly retryable) failure. Acks travel
//! the opposite direction to data and must fire downstream-before-upstream
//! for the same transaction.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use sluice_message::Batch;

use crate::Error;

/// Outcome delivered through an acknowledgement callback
pub type AckResult = std::result::Result<(), Error>;

/// Future returned by an acknowledgement callback
pub type AckFuture = Pin<Box<dyn Future<Output = AckResult> + Send>>;

/// Single-shot acknowledgement callback
///
/// Drivers must invoke the callback exactly once per received transaction.
pub type AckFn = Box<dyn FnOnce(AckResult) -> AckFuture + Send>;

/// A batch paired with its acknowledgement callback
pub struct Transaction {
    batch: Batch,
    ack: AckFn,
}

impl Transaction {
    /// Create a transaction from a batch and its ack callback
    pub fn new(batch: Batch, ack: AckFn) -> Self {
        Self { batch, ack }
    }

    /// Create a transaction whose ack is observed through a oneshot channel
    ///
    /// This is the shape input drivers and tests use: produce the
    /// transaction, then await the receiver for the downstream outcome.
    pub fn channel(batch: Batch) -> (Self, oneshot::Receiver<AckResult>) {
        let (tx, rx) = oneshot::channel();
        let ack: AckFn = Box::new(move |res| {
            let _ = tx.send(res);
            Box::pin(std::future::ready(Ok(())))
        });
        (Self::new(batch, ack), rx)
    }

    /// The batch carried by this transaction
    #[inline]
    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Split the transaction into its batch and ack callback
    pub fn into_parts(self) -> (Batch, AckFn) {
        (self.batch, self.ack)
    }

    /// Deliver the acknowledgement, consuming the transaction
    pub async fn ack(self, res: AckResult) -> AckResult {
        (self.ack)(res).await
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("parts", &self.batch.len())
            .finish_non_exhaustive()
    }
}

/// Aggregates the acks of N derived transactions into one upstream ack
///
/// Brokers and split processors create one `SharedAck` per consumed
/// transaction and attach a derived callback to every copy they emit. The
/// upstream ack fires exactly once:
///
/// - immediately, with the first error any derived ack reports, or
/// - with `Ok(())` once every derived ack has reported success.
///
/// Derived acks arriving after the upstream fired are accepted and
/// discarded.
pub struct SharedAck {
    inner: Arc<SharedAckState>,
}

struct SharedAckState {
    pending: AtomicUsize,
    slot: Mutex<Option<AckFn>>,
}

impl SharedAck {
    /// Wrap an upstream ack expecting `pending` derived outcomes
    pub fn new(ack: AckFn, pending: usize) -> Self {
        debug_assert!(pending > 0, "shared ack needs at least one derived ack");
        Self {
            inner: Arc::new(SharedAckState {
                pending: AtomicUsize::new(pending),
                slot: Mutex::new(Some(ack)),
            }),
        }
    }

    /// Produce one derived ack callback
    pub fn derive(&self) -> AckFn {
        let inner = Arc::clone(&self.inner);
        Box::new(move |res| Box::pin(async move { inner.complete(res).await }))
    }
}

impl SharedAckState {
    async fn complete(&self, res: AckResult) -> AckResult {
        match res {
            Err(err) => {
                // First error wins and fires the upstream ack early.
                let ack = self.slot.lock().expect("ack slot poisoned").take();
                match ack {
                    Some(ack) => ack(Err(err)).await,
                    None => Ok(()),
                }
            }
            Ok(()) => {
                if self.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
                    return Ok(());
                }
                let ack = self.slot.lock().expect("ack slot poisoned").take();
                match ack {
                    Some(ack) => ack(Ok(())).await,
                    None => Ok(()),
                }
            }
        }
    }
}

/// Fold several upstream acks into a single callback
///
/// Used when N source transactions are merged into one downstream batch
/// (batching outputs): the downstream outcome is replayed to every source
/// ack, and the first error any of them returns is surfaced.
pub fn combine_acks(acks: Vec<AckFn>) -> AckFn {
    Box::new(move |res: AckResult| {
        Box::pin(async move {
            let mut out: AckResult = Ok(());
            for ack in acks {
                if let Err(err) = ack(res.clone()).await {
                    if out.is_ok() {
                        out = Err(err);
                    }
                }
            }
            out
        })
    })
}

#[cfg(test)]
#[path = "transaction_test.rs"]
mod transaction_test;
