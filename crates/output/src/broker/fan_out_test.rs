//! Fan-out broker tests

use std::time::{Duration, Instant};

use tokio::time::timeout;

use sluice_component::{Error, Output, Transaction};
use sluice_message::Batch;

use crate::testutil::CapturedOutput;

use super::*;

#[tokio::test]
async fn test_ack_waits_for_slowest_child() {
    let (out_a, mut captured_a) = CapturedOutput::new();
    let (out_b, mut captured_b) = CapturedOutput::new();
    let mut broker = FanOutBroker::new(vec![Box::new(out_a), Box::new(out_b)]).unwrap();

    let (tx, rx) = sluice_component::edge();
    broker.consume(rx).unwrap();

    let (t, ack_rx) = Transaction::channel(Batch::from_payloads(["msg"]));
    let started = Instant::now();
    tx.send(t).await.unwrap();

    let copy_a = captured_a.recv().await.unwrap();
    let copy_b = captured_b.recv().await.unwrap();
    assert_eq!(copy_a.batch().get(0).unwrap().as_bytes(), b"msg");
    assert_eq!(copy_b.batch().get(0).unwrap().as_bytes(), b"msg");

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        copy_a.ack(Ok(())).await.unwrap();
    });
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        copy_b.ack(Ok(())).await.unwrap();
    });

    let res = timeout(Duration::from_secs(2), ack_rx).await.unwrap().unwrap();
    assert_eq!(res, Ok(()));
    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "upstream ack fired before the slowest child"
    );

    drop(tx);
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_child_failure_bubbles_up() {
    let (out_a, mut captured_a) = CapturedOutput::new();
    let (out_b, mut captured_b) = CapturedOutput::new();
    let mut broker = FanOutBroker::new(vec![Box::new(out_a), Box::new(out_b)]).unwrap();

    let (tx, rx) = sluice_component::edge();
    broker.consume(rx).unwrap();

    let (t, ack_rx) = Transaction::channel(Batch::from_payloads(["msg"]));
    tx.send(t).await.unwrap();

    let copy_a = captured_a.recv().await.unwrap();
    let copy_b = captured_b.recv().await.unwrap();

    copy_a.ack(Err(Error::other("boom"))).await.unwrap();
    copy_b.ack(Ok(())).await.unwrap();

    let res = timeout(Duration::from_secs(2), ack_rx).await.unwrap().unwrap();
    assert!(res.unwrap_err().to_string().contains("boom"));

    drop(tx);
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_exactly_one_upstream_ack() {
    let (out_a, mut captured_a) = CapturedOutput::new();
    let (out_b, mut captured_b) = CapturedOutput::new();
    let mut broker = FanOutBroker::new(vec![Box::new(out_a), Box::new(out_b)]).unwrap();

    let (tx, rx) = sluice_component::edge();
    broker.consume(rx).unwrap();

    for round in 0..5 {
        let (t, ack_rx) = Transaction::channel(Batch::from_payloads([format!("m{round}")]));
        tx.send(t).await.unwrap();

        let copy_a = captured_a.recv().await.unwrap();
        let copy_b = captured_b.recv().await.unwrap();
        copy_a.ack(Ok(())).await.unwrap();
        copy_b.ack(Ok(())).await.unwrap();

        // A oneshot receiver observing two sends would have panicked the
        // sender; one clean resolution per round is the exactly-once proof.
        let res = timeout(Duration::from_secs(1), ack_rx).await.unwrap().unwrap();
        assert_eq!(res, Ok(()));
    }

    drop(tx);
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_copies_are_isolated() {
    let (out_a, mut captured_a) = CapturedOutput::new();
    let (out_b, mut captured_b) = CapturedOutput::new();
    let mut broker = FanOutBroker::new(vec![Box::new(out_a), Box::new(out_b)]).unwrap();

    let (tx, rx) = sluice_component::edge();
    broker.consume(rx).unwrap();

    let (t, ack_rx) = Transaction::channel(Batch::from_payloads(["shared"]));
    tx.send(t).await.unwrap();

    let copy_a = captured_a.recv().await.unwrap();
    let copy_b = captured_b.recv().await.unwrap();

    // Mutating one copy must not affect the other.
    let (mut batch_a, ack_a) = copy_a.into_parts();
    batch_a.get_mut(0).unwrap().set_bytes("mutated");
    assert_eq!(copy_b.batch().get(0).unwrap().as_bytes(), b"shared");

    ack_a(Ok(())).await.unwrap();
    copy_b.ack(Ok(())).await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(1), ack_rx).await.unwrap().unwrap(),
        Ok(())
    );

    drop(tx);
    broker.wait_for_close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_drain_waits_for_pending_acks() {
    let (out_a, mut captured_a) = CapturedOutput::new();
    let mut broker = FanOutBroker::new(vec![Box::new(out_a)]).unwrap();

    let (tx, rx) = sluice_component::edge();
    broker.consume(rx).unwrap();

    let (t, ack_rx) = Transaction::channel(Batch::from_payloads(["msg"]));
    tx.send(t).await.unwrap();
    let copy = captured_a.recv().await.unwrap();

    // Close the upstream edge while the child ack is still pending.
    drop(tx);
    assert!(
        broker.wait_for_close(Duration::from_millis(100)).await.is_err(),
        "broker closed before pending ack resolved"
    );

    copy.ack(Ok(())).await.unwrap();
    assert_eq!(ack_rx.await.unwrap(), Ok(()));
    broker.wait_for_close(Duration::from_secs(2)).await.unwrap();
}
