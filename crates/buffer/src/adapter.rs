//! Buffer adapter - split the end-to-end ack at the buffer

use std::sync::Arc;
use std::time::Duration;

use crossfire::MAsyncRx;

use sluice_component::{Error, Result, Transaction};
use sluice_shutdown::Signaller;

use crate::BufferReaderWriter;

/// Wires a pluggable buffer between two graph edges
///
/// The producer side consumes the upstream edge, stores each batch and
/// acks the upstream with the store outcome. The consumer side reads
/// batches back and emits fresh transactions whose acks drive deletion
/// (or requeue, on failure). Both sides are owned tasks; the adapter
/// reports closed once the buffer has drained after end-of-input.
pub struct BufferAdapter {
    buffer: Arc<dyn BufferReaderWriter>,
    rx: MAsyncRx<Transaction>,
    out_tx: Option<crossfire::MAsyncTx<Transaction>>,
    shut_sig: Signaller,
    started: bool,
}

impl BufferAdapter {
    pub fn new(buffer: Arc<dyn BufferReaderWriter>) -> Self {
        let (out_tx, rx) = sluice_component::edge();
        Self {
            buffer,
            rx,
            out_tx: Some(out_tx),
            shut_sig: Signaller::new(),
            started: false,
        }
    }

    /// A clone of the adapter's outgoing edge
    pub fn transaction_rx(&self) -> MAsyncRx<Transaction> {
        self.rx.clone()
    }

    /// Bind the upstream edge and start both sides
    pub fn consume(&mut self, rx_in: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let out_tx = self.out_tx.take().expect("adapter edge consumed twice");
        let buffer = Arc::clone(&self.buffer);
        let sig = self.shut_sig.clone();

        // Producer: input edge -> buffer, acking the input on store.
        let producer = {
            let buffer = Arc::clone(&buffer);
            let sig = sig.clone();
            tokio::spawn(async move {
                loop {
                    let t = tokio::select! {
                        biased;
                        res = rx_in.recv() => match res {
                            Ok(t) => t,
                            Err(_) => break,
                        },
                        _ = sig.at_leisure_requested() => break,
                    };
                    let (batch, ack) = t.into_parts();
                    let res = tokio::select! {
                        res = buffer.write(batch) => res,
                        _ = sig.now_requested() => Err(Error::TypeClosed),
                    };
                    let failed = res.is_err();
                    let _ = ack(res).await;
                    if failed {
                        break;
                    }
                }
                buffer.end_of_input();
            })
        };

        // Consumer: buffer -> output edge, deleting on downstream ack.
        let consumer = {
            let buffer = Arc::clone(&buffer);
            let sig = sig.clone();
            tokio::spawn(async move {
                loop {
                    let leased = tokio::select! {
                        res = buffer.read() => match res {
                            Ok(leased) => leased,
                            Err(_) => break,
                        },
                        _ = sig.now_requested() => break,
                    };

                    let commit = leased.commit;
                    let t = Transaction::new(
                        leased.batch,
                        Box::new(move |res| {
                            Box::pin(async move {
                                commit(res).await;
                                Ok(())
                            })
                        }),
                    );

                    tokio::select! {
                        res = out_tx.send(t) => {
                            if let Err(err) = res {
                                let _ = err.0.ack(Err(Error::TypeClosed)).await;
                                break;
                            }
                        }
                        _ = sig.now_requested() => break,
                    }
                }
            })
        };

        let buffer = Arc::clone(&self.buffer);
        let sig = self.shut_sig.clone();
        tokio::spawn(async move {
            let _ = producer.await;
            let _ = consumer.await;
            if let Err(err) = buffer.close().await {
                tracing::warn!(error = %err, "buffer close failed");
            }
            sig.shutdown_complete();
        });
        Ok(())
    }

    /// Request a graceful drain
    pub fn close_at_leisure(&self) {
        self.shut_sig.close_at_leisure();
    }

    /// Request an immediate stop
    pub fn close_now(&self) {
        self.shut_sig.close_now();
    }

    /// Wait until both sides have exited and the buffer is closed
    pub async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        if self.shut_sig.wait_for_close(timeout).await {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}

#[cfg(test)]
#[path = "adapter_test.rs"]
mod adapter_test;
