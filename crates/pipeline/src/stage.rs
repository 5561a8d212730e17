//! The processor stage

use std::sync::Arc;
use std::time::Duration;

use crossfire::{MAsyncRx, MAsyncTx};

use sluice_component::{Error, Processor, Result, SharedAck, Transaction};
use sluice_message::Batch;
use sluice_shutdown::Signaller;

use crate::metrics::{PipelineMetrics, PipelineMetricsSnapshot};

/// A parallel stage applying an ordered processor list
///
/// The stage is both a consumer and a producer: bind the upstream edge
/// with [`Pipeline::consume`], read results from
/// [`Pipeline::transaction_rx`].
pub struct Pipeline {
    threads: usize,
    processors: Arc<Vec<Box<dyn Processor>>>,
    rx: MAsyncRx<Transaction>,
    out_tx: Option<MAsyncTx<Transaction>>,
    shut_sig: Signaller,
    metrics: Arc<PipelineMetrics>,
    started: bool,
}

impl Pipeline {
    /// Create a stage with `threads` workers
    pub fn new(threads: usize, processors: Vec<Box<dyn Processor>>) -> Self {
        let (out_tx, rx) = sluice_component::edge();
        Self {
            threads: threads.max(1),
            processors: Arc::new(processors),
            rx,
            out_tx: Some(out_tx),
            shut_sig: Signaller::new(),
            metrics: Arc::new(PipelineMetrics::new()),
            started: false,
        }
    }

    /// A clone of the stage's outgoing edge
    pub fn transaction_rx(&self) -> MAsyncRx<Transaction> {
        self.rx.clone()
    }

    /// Point-in-time snapshot of the stage's counters
    pub fn metrics_snapshot(&self) -> PipelineMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Bind the upstream edge and start the workers
    pub fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let out_tx = self.out_tx.take().expect("pipeline edge consumed twice");
        let processors = Arc::clone(&self.processors);
        let metrics = Arc::clone(&self.metrics);
        let sig = self.shut_sig.clone();
        let threads = self.threads;

        tokio::spawn(async move {
            tracing::info!(
                threads,
                processors = processors.len(),
                "pipeline starting"
            );

            let mut workers = Vec::with_capacity(threads);
            for _ in 0..threads {
                workers.push(tokio::spawn(worker(
                    rx.clone(),
                    out_tx.clone(),
                    Arc::clone(&processors),
                    Arc::clone(&metrics),
                    sig.clone(),
                )));
            }
            drop(out_tx);
            drop(rx);
            for handle in workers {
                let _ = handle.await;
            }

            for processor in processors.iter() {
                if let Err(err) = processor.close().await {
                    tracing::warn!(
                        processor = %processor.name(),
                        error = %err,
                        "processor close failed"
                    );
                }
            }

            let snapshot = metrics.snapshot();
            tracing::info!(
                received = snapshot.received,
                sent = snapshot.sent,
                dropped = snapshot.dropped,
                errors = snapshot.errors,
                "pipeline shutting down"
            );
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

    /// Wait until every worker has exited
    pub async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        if self.shut_sig.wait_for_close(timeout).await {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}

/// Apply the processor list to one batch
async fn apply_all(processors: &[Box<dyn Processor>], batch: Batch) -> Result<Vec<Batch>> {
    let mut batches = vec![batch];
    for processor in processors {
        let mut next = Vec::with_capacity(batches.len());
        for batch in batches {
            next.extend(processor.process(batch).await?);
        }
        batches = next;
        if batches.is_empty() {
            break;
        }
    }
    Ok(batches)
}

async fn worker(
    rx: MAsyncRx<Transaction>,
    out_tx: MAsyncTx<Transaction>,
    processors: Arc<Vec<Box<dyn Processor>>>,
    metrics: Arc<PipelineMetrics>,
    sig: Signaller,
) {
    loop {
        let t = tokio::select! {
            biased;
            res = rx.recv() => match res {
                Ok(t) => t,
                Err(_) => break,
            },
            _ = sig.now_requested() => break,
        };

        metrics.record_received(t.batch().len() as u64);
        let (batch, ack) = t.into_parts();

        let mut batches = match apply_all(&processors, batch).await {
            Ok(batches) => batches,
            Err(err) => {
                metrics.record_error();
                tracing::warn!(error = %err, "processor failed transaction");
                let _ = ack(Err(err)).await;
                continue;
            }
        };

        let outgoing: Vec<Transaction> = match batches.len() {
            0 => {
                metrics.record_dropped();
                let _ = ack(Ok(())).await;
                continue;
            }
            1 => vec![Transaction::new(batches.pop().expect("one batch"), ack)],
            n => {
                let shared = SharedAck::new(ack, n);
                batches
                    .into_iter()
                    .map(|b| Transaction::new(b, shared.derive()))
                    .collect()
            }
        };

        metrics.record_sent(outgoing.len() as u64);
        for t in outgoing {
            tokio::select! {
                res = out_tx.send(t) => {
                    if let Err(err) = res {
                        let _ = err.0.ack(Err(Error::TypeClosed)).await;
                        return;
                    }
                }
                _ = sig.now_requested() => return,
            }
        }
    }
}

#[cfg(test)]
#[path = "stage_test.rs"]
mod stage_test;
