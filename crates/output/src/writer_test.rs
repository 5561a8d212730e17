//! Async writer tests

use std::sync::Mutex as StdMutex;

use sluice_message::BatchError;

use super::*;

/// Scripted writer: pops one outcome per write call
struct ScriptedWriter {
    connects: AtomicU64,
    writes: StdMutex<Vec<Batch>>,
    script: StdMutex<Vec<Result<()>>>,
    fail_first_connects: u64,
}

impl ScriptedWriter {
    fn new(script: Vec<Result<()>>) -> Self {
        Self {
            connects: AtomicU64::new(0),
            writes: StdMutex::new(Vec::new()),
            script: StdMutex::new(script),
            fail_first_connects: 0,
        }
    }

    fn with_failing_connects(mut self, count: u64) -> Self {
        self.fail_first_connects = count;
        self
    }
}

#[async_trait]
impl Writer for &'static ScriptedWriter {
    async fn connect(&self) -> Result<()> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first_connects {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    async fn write(&self, batch: &Batch) -> Result<()> {
        let outcome = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(())
            } else {
                script.remove(0)
            }
        };
        if outcome.is_ok() {
            self.writes.lock().unwrap().push(batch.clone());
        }
        outcome
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn leak(writer: ScriptedWriter) -> &'static ScriptedWriter {
    Box::leak(Box::new(writer))
}

fn fast_conf() -> WriterConfig {
    WriterConfig {
        backoff: crate::BackoffConfig {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
            jitter: false,
        },
        ..Default::default()
    }
}

async fn feed(
    tx: &crossfire::MAsyncTx<Transaction>,
    payloads: &[&'static str],
) -> tokio::sync::oneshot::Receiver<AckResult> {
    let (t, ack_rx) = Transaction::channel(Batch::from_payloads(payloads.to_vec()));
    tx.send(t).await.unwrap();
    ack_rx
}

#[tokio::test]
async fn test_successful_write_acks_ok() {
    let writer = leak(ScriptedWriter::new(vec![]));
    let mut output = AsyncWriter::new("scripted", writer, fast_conf());

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let ack = feed(&tx, &["hello"]).await;
    assert_eq!(ack.await.unwrap(), Ok(()));
    assert_eq!(writer.writes.lock().unwrap().len(), 1);
    assert!(output.connected());

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert_eq!(output.metrics_snapshot().batches_written, 1);
}

#[tokio::test]
async fn test_consume_twice_returns_already_started() {
    let writer = leak(ScriptedWriter::new(vec![]));
    let mut output = AsyncWriter::new("scripted", writer, fast_conf());

    let (_tx, rx) = sluice_component::edge();
    output.consume(rx.clone()).unwrap();
    assert_eq!(output.consume(rx).unwrap_err(), Error::AlreadyStarted);
}

#[tokio::test]
async fn test_reconnect_then_retry_same_batch() {
    // First write reports a lost connection; the second must succeed with
    // exactly one delivered copy and no duplicate reads upstream.
    let writer = leak(ScriptedWriter::new(vec![Err(Error::NotConnected)]));
    let mut output = AsyncWriter::new("scripted", writer, fast_conf());

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let ack = feed(&tx, &["payload"]).await;
    assert_eq!(ack.await.unwrap(), Ok(()));

    let writes = writer.writes.lock().unwrap();
    assert_eq!(writes.len(), 1, "batch was written more than once");
    assert_eq!(writes[0].get(0).unwrap().as_bytes(), b"payload");
    drop(writes);

    // Connect ran twice: once initially, once after the drop.
    assert_eq!(writer.connects.load(Ordering::SeqCst), 2);

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_connect_retries_with_backoff() {
    let writer = leak(ScriptedWriter::new(vec![]).with_failing_connects(3));
    let mut output = AsyncWriter::new("scripted", writer, fast_conf());

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let ack = feed(&tx, &["x"]).await;
    assert_eq!(ack.await.unwrap(), Ok(()));
    assert_eq!(writer.connects.load(Ordering::SeqCst), 4);

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_partial_batch_retry() {
    let mut batch_err = BatchError::new(3);
    batch_err.fail(0, "rejected");
    batch_err.fail(2, "rejected");

    let writer = leak(ScriptedWriter::new(vec![Err(Error::Batch(batch_err))]));
    let mut output = AsyncWriter::new("scripted", writer, fast_conf());

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let ack = feed(&tx, &["a", "b", "c"]).await;
    assert_eq!(ack.await.unwrap(), Ok(()));

    // Only the failed parts were retried.
    let writes = writer.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 2);
    assert_eq!(writes[0].get(0).unwrap().as_bytes(), b"a");
    assert_eq!(writes[0].get(1).unwrap().as_bytes(), b"c");
    drop(writes);

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_whole_batch_retry_when_configured() {
    let mut batch_err = BatchError::new(2);
    batch_err.fail(1, "rejected");

    let writer = leak(ScriptedWriter::new(vec![Err(Error::Batch(batch_err))]));
    let conf = WriterConfig {
        retry_as_batch: true,
        ..fast_conf()
    };
    let mut output = AsyncWriter::new("scripted", writer, conf);

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let ack = feed(&tx, &["a", "b"]).await;
    assert_eq!(ack.await.unwrap(), Ok(()));

    let writes = writer.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 2);
    drop(writes);

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_retry_budget_exhaustion_surfaces_error() {
    let writer = leak(ScriptedWriter::new(vec![
        Err(Error::other("boom")),
        Err(Error::other("boom")),
        Err(Error::other("boom")),
    ]));
    let conf = WriterConfig {
        max_retries: 2,
        ..fast_conf()
    };
    let mut output = AsyncWriter::new("scripted", writer, conf);

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let ack = feed(&tx, &["x"]).await;
    let err = ack.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("boom"));
    assert!(writer.writes.lock().unwrap().is_empty());

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_close_now_abandons_pending_write() {
    // A writer that blocks forever on its first write.
    struct StuckWriter;
    #[async_trait]
    impl Writer for StuckWriter {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }
        async fn write(&self, _batch: &Batch) -> Result<()> {
            std::future::pending().await
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    let mut output = AsyncWriter::new("stuck", StuckWriter, fast_conf());
    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let ack = feed(&tx, &["x"]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    output.close_now();
    assert_eq!(ack.await.unwrap(), Err(Error::TypeClosed));

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_parallel_workers_share_edge() {
    // Two slow-but-ok writes must overlap when max_in_flight = 2.
    struct SlowWriter;
    #[async_trait]
    impl Writer for SlowWriter {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }
        async fn write(&self, _batch: &Batch) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    let conf = WriterConfig {
        max_in_flight: 2,
        ..fast_conf()
    };
    let mut output = AsyncWriter::new("slow", SlowWriter, conf);
    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let started = std::time::Instant::now();
    let ack_a = feed(&tx, &["a"]).await;
    let ack_b = feed(&tx, &["b"]).await;
    assert_eq!(ack_a.await.unwrap(), Ok(()));
    assert_eq!(ack_b.await.unwrap(), Ok(()));

    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(190),
        "writes did not overlap: {elapsed:?}"
    );

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}
