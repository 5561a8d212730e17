//! Generate input - synthetic payloads on an interval

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use crossfire::MAsyncRx;

use sluice_component::{Error, Input, Result, Transaction};
use sluice_message::{Batch, MessagePart};
use sluice_shutdown::Signaller;

/// Configuration for the generate input
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Payload of every generated part
    pub payload: String,

    /// Delay between generated batches; zero produces as fast as the
    /// graph acknowledges
    pub interval: Duration,

    /// Number of batches to produce before closing (0 = unbounded)
    pub count: usize,

    /// Parts per generated batch
    pub batch_size: usize,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            payload: String::new(),
            interval: Duration::from_secs(1),
            count: 0,
            batch_size: 1,
        }
    }
}

/// Produces synthetic batches until stopped or its count is exhausted
///
/// Each batch is produced, sent, and its acknowledgement awaited before
/// the next one, so a stalled graph stops generation (back-pressure) and
/// a failed delivery is visible in the logs.
pub struct GenerateInput {
    rx: MAsyncRx<Transaction>,
    shut_sig: Signaller,
}

impl GenerateInput {
    pub fn new(conf: GenerateConfig) -> Self {
        let (tx, rx) = sluice_component::edge();
        let shut_sig = Signaller::new();

        let sig = shut_sig.clone();
        tokio::spawn(async move {
            let payload = Bytes::from(conf.payload.into_bytes());
            let batch_size = conf.batch_size.max(1);
            let mut produced = 0usize;

            tracing::info!(
                count = conf.count,
                interval_ms = conf.interval.as_millis() as u64,
                "generate input starting"
            );

            loop {
                if conf.count > 0 && produced >= conf.count {
                    break;
                }
                if !conf.interval.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(conf.interval) => {}
                        _ = sig.at_leisure_requested() => break,
                    }
                } else if sig.should_close_at_leisure() {
                    break;
                }

                let parts = (0..batch_size)
                    .map(|_| MessagePart::new(payload.clone()))
                    .collect();
                let (t, ack_rx) = Transaction::channel(Batch::new(parts));

                tokio::select! {
                    res = tx.send(t) => {
                        if res.is_err() {
                            break;
                        }
                    }
                    _ = sig.at_leisure_requested() => break,
                }
                produced += 1;

                tokio::select! {
                    res = ack_rx => {
                        if let Ok(Err(err)) = res {
                            tracing::warn!(error = %err, "generated batch was rejected downstream");
                        }
                    }
                    _ = sig.now_requested() => break,
                }
            }

            drop(tx);
            tracing::info!(produced, "generate input finished");
            sig.shutdown_complete();
        });

        Self { rx, shut_sig }
    }
}

#[async_trait]
impl Input for GenerateInput {
    fn transaction_rx(&self) -> MAsyncRx<Transaction> {
        self.rx.clone()
    }

    fn connected(&self) -> bool {
        !self.shut_sig.has_closed()
    }

    fn close_at_leisure(&self) {
        self.shut_sig.close_at_leisure();
    }

    fn close_now(&self) {
        self.shut_sig.close_now();
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        if self.shut_sig.wait_for_close(timeout).await {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}

#[cfg(test)]
#[path = "generate_test.rs"]
mod generate_test;
