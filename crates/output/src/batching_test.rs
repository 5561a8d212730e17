//! Batching output tests

use std::time::Duration;

use tokio::time::timeout;

use sluice_batcher::{Policy, PolicyConfig};
use sluice_component::{Output, Transaction};
use sluice_message::Batch;

use crate::testutil::CapturedOutput;

use super::*;

fn count_policy(count: usize) -> Policy {
    Policy::new(PolicyConfig {
        count,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_flush_on_count_and_ack_fan_back() {
    let (inner, mut captured) = CapturedOutput::new();
    let mut output = BatchingOutput::new(Box::new(inner), count_policy(3)).unwrap();

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let mut acks = Vec::new();
    for payload in ["a", "b", "c"] {
        let (t, ack_rx) = Transaction::channel(Batch::from_payloads([payload]));
        tx.send(t).await.unwrap();
        acks.push(ack_rx);
    }

    let merged = timeout(Duration::from_secs(1), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged.batch().len(), 3);
    merged.ack(Ok(())).await.unwrap();

    for ack in acks {
        assert_eq!(
            timeout(Duration::from_secs(1), ack).await.unwrap().unwrap(),
            Ok(())
        );
    }

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_final_flush_on_close() {
    let (inner, mut captured) = CapturedOutput::new();
    let mut output = BatchingOutput::new(Box::new(inner), count_policy(100)).unwrap();

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let (t, ack_rx) = Transaction::channel(Batch::from_payloads(["tail"]));
    tx.send(t).await.unwrap();
    drop(tx);

    // The partial batch flushes when the upstream edge closes.
    let merged = timeout(Duration::from_secs(1), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged.batch().len(), 1);
    merged.ack(Ok(())).await.unwrap();
    assert_eq!(ack_rx.await.unwrap(), Ok(()));

    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_period_flush() {
    let (inner, mut captured) = CapturedOutput::new();
    let policy = Policy::new(PolicyConfig {
        period: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let mut output = BatchingOutput::new(Box::new(inner), policy).unwrap();

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let (t, ack_rx) = Transaction::channel(Batch::from_payloads(["timed"]));
    tx.send(t).await.unwrap();

    // No count trigger: the period must flush it.
    let merged = timeout(Duration::from_secs(1), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged.batch().len(), 1);
    merged.ack(Ok(())).await.unwrap();
    assert_eq!(ack_rx.await.unwrap(), Ok(()));

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_error_fans_back_to_all_sources() {
    let (inner, mut captured) = CapturedOutput::new();
    let mut output = BatchingOutput::new(Box::new(inner), count_policy(2)).unwrap();

    let (tx, rx) = sluice_component::edge();
    output.consume(rx).unwrap();

    let (t1, ack_1) = Transaction::channel(Batch::from_payloads(["a"]));
    tx.send(t1).await.unwrap();
    let (t2, ack_2) = Transaction::channel(Batch::from_payloads(["b"]));
    tx.send(t2).await.unwrap();

    let merged = captured.recv().await.unwrap();
    merged
        .ack(Err(sluice_component::Error::NotConnected))
        .await
        .unwrap();

    assert_eq!(ack_1.await.unwrap(), Err(sluice_component::Error::NotConnected));
    assert_eq!(ack_2.await.unwrap(), Err(sluice_component::Error::NotConnected));

    drop(tx);
    output.wait_for_close(Duration::from_secs(1)).await.unwrap();
}
