//! Pipeline stage tests

use std::time::Instant;

use async_trait::async_trait;

use sluice_processor::{NoopProcessor, SplitProcessor};

use super::*;

/// Sleeps per batch, then forwards it unchanged
struct SleepProcessor(Duration);

#[async_trait]
impl Processor for SleepProcessor {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>> {
        tokio::time::sleep(self.0).await;
        Ok(vec![batch])
    }

    fn name(&self) -> &str {
        "sleep"
    }
}

/// Drops every batch
struct DropAllProcessor;

#[async_trait]
impl Processor for DropAllProcessor {
    async fn process(&self, _batch: Batch) -> Result<Vec<Batch>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "drop_all"
    }
}

/// Fails every batch
struct FailProcessor;

#[async_trait]
impl Processor for FailProcessor {
    async fn process(&self, _batch: Batch) -> Result<Vec<Batch>> {
        Err(Error::other("processor exploded"))
    }

    fn name(&self) -> &str {
        "fail"
    }
}

async fn feed(
    tx: &MAsyncTx<Transaction>,
    payload: &str,
) -> tokio::sync::oneshot::Receiver<sluice_component::AckResult> {
    let (t, ack_rx) = Transaction::channel(Batch::from_payloads([payload.to_string()]));
    tx.send(t).await.unwrap();
    ack_rx
}

#[tokio::test]
async fn test_single_thread_preserves_order() {
    let mut pipeline = Pipeline::new(1, vec![Box::new(NoopProcessor)]);
    let (tx, rx) = sluice_component::edge();
    pipeline.consume(rx).unwrap();
    let out = pipeline.transaction_rx();

    let feeder = {
        let tx = tx.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                let (t, _ack) = Transaction::channel(Batch::from_payloads([format!("m{i:02}")]));
                tx.send(t).await.unwrap();
            }
        })
    };

    for i in 0..20 {
        let t = tokio::time::timeout(Duration::from_secs(1), out.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            t.batch().get(0).unwrap().as_bytes(),
            format!("m{i:02}").as_bytes()
        );
        t.ack(Ok(())).await.unwrap();
    }

    feeder.await.unwrap();
    drop(tx);
    pipeline.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_drop_acks_upstream_immediately() {
    let mut pipeline = Pipeline::new(1, vec![Box::new(DropAllProcessor)]);
    let (tx, rx) = sluice_component::edge();
    pipeline.consume(rx).unwrap();

    let ack = feed(&tx, "vanishes").await;
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), ack)
            .await
            .unwrap()
            .unwrap(),
        Ok(())
    );

    drop(tx);
    pipeline.wait_for_close(Duration::from_secs(1)).await.unwrap();
    let snapshot = pipeline.metrics_snapshot();
    assert_eq!(snapshot.dropped, 1);
}

#[tokio::test]
async fn test_processor_error_fails_transaction() {
    let mut pipeline = Pipeline::new(1, vec![Box::new(FailProcessor)]);
    let (tx, rx) = sluice_component::edge();
    pipeline.consume(rx).unwrap();

    let ack = feed(&tx, "doomed").await;
    let err = ack.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("exploded"));

    drop(tx);
    pipeline.wait_for_close(Duration::from_secs(1)).await.unwrap();
    assert_eq!(pipeline.metrics_snapshot().errors, 1);
}

#[tokio::test]
async fn test_split_ack_requires_all_derived_acks() {
    let mut pipeline = Pipeline::new(1, vec![Box::new(SplitProcessor::new(1))]);
    let (tx, rx) = sluice_component::edge();
    pipeline.consume(rx).unwrap();
    let out = pipeline.transaction_rx();

    let (t, mut ack_rx) = Transaction::channel(Batch::from_payloads(["a", "b"]));
    tx.send(t).await.unwrap();

    let first = out.recv().await.unwrap();
    let second = out.recv().await.unwrap();

    first.ack(Ok(())).await.unwrap();
    // One derived ack is not enough.
    assert!(ack_rx.try_recv().is_err(), "upstream ack fired early");

    second.ack(Ok(())).await.unwrap();
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(1), ack_rx)
            .await
            .unwrap()
            .unwrap(),
        Ok(())
    );

    drop(tx);
    pipeline.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_back_pressure_under_slow_processor() {
    let delay = Duration::from_millis(100);
    let mut pipeline = Pipeline::new(1, vec![Box::new(SleepProcessor(delay))]);
    let (tx, rx) = sluice_component::edge();
    pipeline.consume(rx).unwrap();
    let out = pipeline.transaction_rx();

    // Downstream acks instantly; the slow processor dominates.
    let sink = tokio::spawn(async move {
        while let Ok(t) = out.recv().await {
            t.ack(Ok(())).await.unwrap();
        }
    });

    let started = Instant::now();
    for i in 0..10 {
        let (t, _ack) = Transaction::channel(Batch::from_payloads([format!("{i}")]));
        tx.send(t).await.unwrap();
    }
    drop(tx);
    pipeline.wait_for_close(Duration::from_secs(5)).await.unwrap();
    sink.await.unwrap();

    // Ten 100 ms batches through one worker cannot finish in under ~1 s,
    // and the bounded edges kept the producer in lockstep.
    assert!(
        started.elapsed() >= Duration::from_millis(900),
        "pipeline ran ahead of its single worker: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_parallel_workers_process_concurrently() {
    let delay = Duration::from_millis(100);
    let mut pipeline = Pipeline::new(4, vec![Box::new(SleepProcessor(delay))]);
    let (tx, rx) = sluice_component::edge();
    pipeline.consume(rx).unwrap();
    let out = pipeline.transaction_rx();

    let sink = tokio::spawn(async move {
        while let Ok(t) = out.recv().await {
            t.ack(Ok(())).await.unwrap();
        }
    });

    let started = Instant::now();
    for i in 0..8 {
        let (t, _ack) = Transaction::channel(Batch::from_payloads([format!("{i}")]));
        tx.send(t).await.unwrap();
    }
    drop(tx);
    pipeline.wait_for_close(Duration::from_secs(5)).await.unwrap();
    sink.await.unwrap();

    // Four workers over eight 100 ms batches: two full rounds plus
    // slack, far below the 800 ms a single worker would need.
    assert!(
        started.elapsed() < Duration::from_millis(700),
        "workers did not overlap: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_consume_twice_returns_already_started() {
    let mut pipeline = Pipeline::new(1, vec![]);
    let (_tx, rx) = sluice_component::edge();
    pipeline.consume(rx.clone()).unwrap();
    assert_eq!(pipeline.consume(rx).unwrap_err(), Error::AlreadyStarted);
}
