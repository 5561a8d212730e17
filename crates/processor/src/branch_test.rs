//! Error-branch processor tests

use async_trait::async_trait;

use sluice_component::{Error, Processor};
use sluice_message::{Batch, MessagePart};

use crate::part_wise::{for_each_part, PartProcessor};

use super::*;

/// Appends a suffix to every payload; fails parts containing "poison"
struct Tag(&'static str);

#[async_trait]
impl PartProcessor for Tag {
    async fn process_part(&self, part: MessagePart) -> sluice_component::Result<Option<MessagePart>> {
        if part.as_bytes().windows(6).any(|w| w == b"poison") {
            return Err(Error::other("poisoned part"));
        }
        let mut data = part.as_bytes().to_vec();
        data.extend_from_slice(self.0.as_bytes());
        let mut out = part;
        out.set_bytes(data);
        Ok(Some(out))
    }

    fn name(&self) -> &str {
        "tag"
    }
}

fn tag(suffix: &'static str) -> Box<dyn Processor> {
    Box::new(for_each_part(Tag(suffix)))
}

#[tokio::test]
async fn test_try_short_circuits_failed_parts() {
    let processor = TryProcessor::new(vec![tag(".a"), tag(".b")]);
    let out = processor
        .process(Batch::from_payloads(["ok", "poison"]))
        .await
        .unwrap();

    let batch = &out[0];
    assert_eq!(batch.get(0).unwrap().as_bytes(), b"ok.a.b");

    // The poisoned part failed at the first child and skipped the second.
    let failed = batch.get(1).unwrap();
    assert!(failed.is_failed());
    assert_eq!(failed.as_bytes(), b"poison");
}

#[tokio::test]
async fn test_try_passes_previously_failed_parts_through() {
    let mut seed = MessagePart::new("earlier");
    seed.set_failed("upstream failure");

    let processor = TryProcessor::new(vec![tag(".a")]);
    let out = processor.process(Batch::new(vec![seed])).await.unwrap();

    let part = out[0].get(0).unwrap();
    assert_eq!(part.as_bytes(), b"earlier");
    assert_eq!(part.failure(), Some("upstream failure"));
}

#[tokio::test]
async fn test_catch_recovers_only_failed_parts() {
    let mut failed = MessagePart::new("bad");
    failed.set_failed("upstream failure");
    let batch = Batch::new(vec![MessagePart::new("good"), failed]);

    let processor = CatchProcessor::new(vec![tag(".recovered")]);
    let out = processor.process(batch).await.unwrap();

    let batch = &out[0];
    // Healthy parts bypass the catch entirely.
    assert_eq!(batch.get(0).unwrap().as_bytes(), b"good");
    // Failed parts run the children and leave un-flagged.
    let recovered = batch.get(1).unwrap();
    assert_eq!(recovered.as_bytes(), b"bad.recovered");
    assert!(!recovered.is_failed());
}

#[tokio::test]
async fn test_catch_clears_flags_even_when_children_fail() {
    let mut failed = MessagePart::new("poison");
    failed.set_failed("upstream failure");

    let processor = CatchProcessor::new(vec![tag(".x")]);
    let out = processor.process(Batch::new(vec![failed])).await.unwrap();

    let part = out[0].get(0).unwrap();
    assert!(!part.is_failed());
}

#[tokio::test]
async fn test_switch_routes_on_failure_flag() {
    let mut failed = MessagePart::new("bad");
    failed.set_failed("upstream failure");
    let batch = Batch::new(vec![MessagePart::new("good"), failed]);

    let processor = SwitchProcessor::new(vec![
        SwitchCase {
            errored: true,
            processors: vec![tag(".dlq")],
        },
        SwitchCase {
            errored: false,
            processors: vec![tag(".main")],
        },
    ]);
    let out = processor.process(batch).await.unwrap();

    let batch = &out[0];
    assert_eq!(batch.get(0).unwrap().as_bytes(), b"good.main");
    // The errored case runs its children on the failed part; the
    // annotation itself is preserved.
    assert_eq!(batch.get(1).unwrap().as_bytes(), b"bad.dlq");
    assert!(batch.get(1).unwrap().is_failed());
}

#[tokio::test]
async fn test_switch_without_matching_case_passes_through() {
    let processor = SwitchProcessor::new(vec![SwitchCase {
        errored: true,
        processors: vec![tag(".dlq")],
    }]);
    let out = processor
        .process(Batch::from_payloads(["untouched"]))
        .await
        .unwrap();
    assert_eq!(out[0].get(0).unwrap().as_bytes(), b"untouched");
}

#[tokio::test]
async fn test_empty_batch_through_branches() {
    for processor in [
        Box::new(TryProcessor::new(vec![tag(".a")])) as Box<dyn Processor>,
        Box::new(CatchProcessor::new(vec![tag(".a")])),
        Box::new(SwitchProcessor::new(vec![])),
    ] {
        let out = processor.process(Batch::default()).await.unwrap();
        assert!(out.is_empty(), "{} emitted for empty batch", processor.name());
    }
}
