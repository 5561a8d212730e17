//! Async writer - the sink-parallelism wrapper
//!
//! Lifts any single-connection [`Writer`] driver into a streamed output:
//! up to `max_in_flight` workers pull from the incoming edge, connections
//! are (re)established under a shared lock with jittered exponential
//! backoff, generic errors retry the same batch against the batch's retry
//! budget, and partial batch errors retry only the failed parts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;
use tokio::sync::Mutex;

use sluice_component::{AckResult, Error, Output, Result, Transaction};
use sluice_message::Batch;
use sluice_shutdown::Signaller;

use crate::backoff::{Backoff, BackoffConfig};

/// A single-connection sink driver
///
/// Implementations must be safe to call from several workers at once;
/// drivers with one underlying connection guard it internally (a mutex
/// around the socket is the usual shape).
///
/// `write` errors steer the wrapper: [`Error::NotConnected`] triggers a
/// reconnect, [`Error::Batch`] a partial retry, anything else a
/// whole-batch retry.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Establish the connection; retried with backoff until it succeeds
    async fn connect(&self) -> Result<()>;

    /// Deliver one batch
    async fn write(&self, batch: &Batch) -> Result<()>;

    /// Release the connection during shutdown
    async fn close(&self) -> Result<()>;
}

/// Tuning for an [`AsyncWriter`]
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Number of workers writing concurrently
    pub max_in_flight: usize,

    /// Write retries before a batch is failed upstream (0 = unbounded)
    pub max_retries: usize,

    /// Retry the whole batch on partial failure instead of only the
    /// failed parts
    pub retry_as_batch: bool,

    /// Backoff applied to reconnects and write retries
    pub backoff: BackoffConfig,

    /// Deadline for a single write attempt
    pub write_timeout: Option<Duration>,

    /// Deadline for a single connect attempt
    pub connect_timeout: Option<Duration>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 1,
            max_retries: 0,
            retry_as_batch: false,
            backoff: BackoffConfig::default(),
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// Atomic counters shared by all workers of one writer
#[derive(Debug, Default)]
pub struct WriterMetrics {
    pub batches_written: AtomicU64,
    pub parts_written: AtomicU64,
    pub write_errors: AtomicU64,
    pub connects: AtomicU64,
}

impl WriterMetrics {
    /// Get snapshot of all counters
    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot {
            batches_written: self.batches_written.load(Ordering::Relaxed),
            parts_written: self.parts_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of writer metrics
#[derive(Debug, Clone, Copy)]
pub struct WriterMetricsSnapshot {
    pub batches_written: u64,
    pub parts_written: u64,
    pub write_errors: u64,
    pub connects: u64,
}

struct Shared<W> {
    kind: String,
    writer: W,
    conf: WriterConfig,
    connected: AtomicBool,
    connect_lock: Mutex<()>,
    shut_sig: Signaller,
    metrics: WriterMetrics,
}

/// Bounded-parallel, reconnecting output around a [`Writer`]
pub struct AsyncWriter<W> {
    shared: Arc<Shared<W>>,
    started: bool,
}

impl<W: Writer + 'static> AsyncWriter<W> {
    /// Wrap a writer driver
    ///
    /// `kind` names the driver in logs (`stdout`, `kafka`, ...).
    pub fn new(kind: impl Into<String>, writer: W, conf: WriterConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                kind: kind.into(),
                writer,
                conf,
                connected: AtomicBool::new(false),
                connect_lock: Mutex::new(()),
                shut_sig: Signaller::new(),
                metrics: WriterMetrics::default(),
            }),
            started: false,
        }
    }

    /// Point-in-time snapshot of the writer's counters
    pub fn metrics_snapshot(&self) -> WriterMetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl<W: Writer + 'static> Shared<W> {
    /// Establish the connection, serialised across workers
    ///
    /// Returns `false` when shutdown interrupted the attempt.
    async fn ensure_connected(&self) -> bool {
        let _guard = self.connect_lock.lock().await;
        if self.connected.load(Ordering::Acquire) {
            return true;
        }

        let mut backoff = Backoff::new(self.conf.backoff.clone());
        loop {
            let attempt = async {
                match self.conf.connect_timeout {
                    Some(deadline) => tokio::time::timeout(deadline, self.writer.connect())
                        .await
                        .unwrap_or(Err(Error::Timeout)),
                    None => self.writer.connect().await,
                }
            };
            let res = tokio::select! {
                res = attempt => res,
                _ = self.shut_sig.now_requested() => return false,
            };
            match res {
                Ok(()) => {
                    self.connected.store(true, Ordering::Release);
                    self.metrics.connects.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(output = %self.kind, "connection established");
                    return true;
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        output = %self.kind,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "connect failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shut_sig.now_requested() => return false,
                    }
                }
            }
        }
    }

    async fn write_once(&self, batch: &Batch) -> Result<()> {
        match self.conf.write_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.writer.write(batch))
                .await
                .unwrap_or(Err(Error::Timeout)),
            None => self.writer.write(batch).await,
        }
    }

    /// Deliver one batch, reconnecting and retrying per configuration
    async fn write_with_retry(&self, batch: Batch) -> AckResult {
        let mut backoff = Backoff::new(self.conf.backoff.clone());
        let mut current = batch;
        let mut attempts = 0usize;

        loop {
            if !self.connected.load(Ordering::Acquire) && !self.ensure_connected().await {
                return Err(Error::TypeClosed);
            }

            let res = tokio::select! {
                res = self.write_once(&current) => res,
                _ = self.shut_sig.now_requested() => return Err(Error::TypeClosed),
            };

            let err = match res {
                Ok(()) => {
                    self.metrics.batches_written.fetch_add(1, Ordering::Relaxed);
                    self.metrics
                        .parts_written
                        .fetch_add(current.ack_len() as u64, Ordering::Relaxed);
                    return Ok(());
                }
                Err(err) => err,
            };
            self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);

            match err {
                Error::NotConnected => {
                    // Lost the link: flag it down and reconnect before the
                    // same batch is retried. Reconnects do not consume the
                    // retry budget.
                    self.connected.store(false, Ordering::Release);
                    tracing::warn!(output = %self.kind, "connection lost, reconnecting");
                    continue;
                }
                Error::Batch(batch_err) if !self.conf.retry_as_batch => {
                    attempts += 1;
                    if self.conf.max_retries > 0 && attempts > self.conf.max_retries {
                        return Err(Error::Batch(batch_err));
                    }
                    tracing::warn!(
                        output = %self.kind,
                        failed = batch_err.len(),
                        of = current.len(),
                        "partial write failure, retrying failed parts"
                    );
                    current = batch_err.failed_batch(&current);
                }
                err => {
                    attempts += 1;
                    if self.conf.max_retries > 0 && attempts > self.conf.max_retries {
                        return Err(err);
                    }
                    tracing::warn!(
                        output = %self.kind,
                        error = %err,
                        attempt = attempts,
                        "write failed, retrying"
                    );
                }
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shut_sig.now_requested() => return Err(Error::TypeClosed),
            }
        }
    }

    async fn worker(self: Arc<Self>, rx: MAsyncRx<Transaction>) {
        // Establish the connection before the first read so liveness
        // probes reflect the link, not the traffic.
        if !self.connected.load(Ordering::Acquire) && !self.ensure_connected().await {
            return;
        }
        loop {
            // Biased towards the edge so queued transactions drain before
            // an at-leisure close is honoured.
            let t = tokio::select! {
                biased;
                res = rx.recv() => match res {
                    Ok(t) => t,
                    Err(_) => break,
                },
                _ = self.shut_sig.at_leisure_requested() => break,
            };

            let (batch, ack) = t.into_parts();
            let res = self.write_with_retry(batch).await;
            if let Err(err) = ack(res).await {
                tracing::debug!(output = %self.kind, error = %err, "upstream rejected ack");
            }
        }
    }
}

#[async_trait]
impl<W: Writer + 'static> Output for AsyncWriter<W> {
    fn consume(&mut self, rx: MAsyncRx<Transaction>) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let workers = shared.conf.max_in_flight.max(1);
            tracing::info!(output = %shared.kind, workers, "writer starting");

            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(tokio::spawn(Arc::clone(&shared).worker(rx.clone())));
            }
            drop(rx);
            for handle in handles {
                let _ = handle.await;
            }

            if let Err(err) = shared.writer.close().await {
                tracing::warn!(output = %shared.kind, error = %err, "writer close failed");
            }

            let snapshot = shared.metrics.snapshot();
            tracing::info!(
                output = %shared.kind,
                batches_written = snapshot.batches_written,
                parts_written = snapshot.parts_written,
                write_errors = snapshot.write_errors,
                connects = snapshot.connects,
                "writer shutting down"
            );
            shared.shut_sig.shutdown_complete();
        });
        Ok(())
    }

    fn connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn close_at_leisure(&self) {
        self.shared.shut_sig.close_at_leisure();
    }

    fn close_now(&self) {
        self.shared.shut_sig.close_now();
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        if self.shared.shut_sig.wait_for_close(timeout).await {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
