//! Error-branch processors
//!
//! `try`, `catch` and `switch` route parts on their failure annotation:
//! a part that failed an earlier step bypasses `try` children, enters
//! `catch` children, and selects its `switch` case. None of them abort a
//! batch; failure stays a per-part property.

use async_trait::async_trait;

use sluice_component::{Processor, Result};
use sluice_message::{Batch, MessagePart};

/// Run `children` over a single seed part
///
/// With `skip_failed`, parts carrying a failure annotation bypass the
/// remaining children (the `try` short-circuit); without it, children see
/// every part. A child error annotates the parts it was given instead of
/// propagating, matching the per-part failure model.
async fn apply_chain(
    children: &[Box<dyn Processor>],
    shell: &Batch,
    seed: MessagePart,
    skip_failed: bool,
) -> Vec<MessagePart> {
    let mut current = vec![seed];
    for child in children {
        let mut next = Vec::new();
        let mut live = Vec::new();
        for part in current {
            if skip_failed && part.is_failed() {
                next.push(part);
            } else {
                live.push(part);
            }
        }
        if !live.is_empty() {
            let backup = live.clone();
            match child.process(shell.with_parts(live)).await {
                Ok(batches) => {
                    for batch in batches {
                        next.extend(batch.into_parts());
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        processor = %child.name(),
                        error = %err,
                        "branch child failed, annotating parts"
                    );
                    for mut part in backup {
                        part.set_failed(err.to_string());
                        next.push(part);
                    }
                }
            }
        }
        current = next;
    }
    current
}

fn collect(shell: &Batch, parts: Vec<MessagePart>) -> Vec<Batch> {
    if parts.is_empty() {
        Vec::new()
    } else {
        vec![shell.with_parts(parts)]
    }
}

/// Applies children in sequence, skipping parts that have already failed
///
/// A part that fails at step k bypasses the remaining children, so a
/// chain behaves like a short-circuiting sequence of fallible steps.
pub struct TryProcessor {
    children: Vec<Box<dyn Processor>>,
}

impl TryProcessor {
    pub fn new(children: Vec<Box<dyn Processor>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Processor for TryProcessor {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>> {
        let shell = batch.with_parts(Vec::new());
        let mut out = Vec::with_capacity(batch.len());
        for part in batch {
            out.extend(apply_chain(&self.children, &shell, part, true).await);
        }
        Ok(collect(&shell, out))
    }

    fn name(&self) -> &str {
        "try"
    }
}

/// Applies children only to failed parts, then clears their annotations
///
/// Parts that never failed pass through untouched. Parts leaving a catch
/// are always un-flagged: the catch block owns the recovery.
pub struct CatchProcessor {
    children: Vec<Box<dyn Processor>>,
}

impl CatchProcessor {
    pub fn new(children: Vec<Box<dyn Processor>>) -> Self {
        Self { children }
    }
}

#[async_trait]
impl Processor for CatchProcessor {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>> {
        let shell = batch.with_parts(Vec::new());
        let mut out = Vec::with_capacity(batch.len());
        for part in batch {
            if !part.is_failed() {
                out.push(part);
                continue;
            }
            let mut seed = part;
            seed.clear_failed();
            for mut recovered in apply_chain(&self.children, &shell, seed, true).await {
                recovered.clear_failed();
                out.push(recovered);
            }
        }
        Ok(collect(&shell, out))
    }

    fn name(&self) -> &str {
        "catch"
    }
}

/// One routing case of a [`SwitchProcessor`]
pub struct SwitchCase {
    /// Matches parts whose failure annotation state equals this flag
    pub errored: bool,
    pub processors: Vec<Box<dyn Processor>>,
}

/// Routes each part to the first case matching its failure state
///
/// Parts matching no case pass through unchanged.
pub struct SwitchProcessor {
    cases: Vec<SwitchCase>,
}

impl SwitchProcessor {
    pub fn new(cases: Vec<SwitchCase>) -> Self {
        Self { cases }
    }
}

#[async_trait]
impl Processor for SwitchProcessor {
    async fn process(&self, batch: Batch) -> Result<Vec<Batch>> {
        let shell = batch.with_parts(Vec::new());
        let mut out = Vec::with_capacity(batch.len());
        for part in batch {
            match self.cases.iter().find(|c| c.errored == part.is_failed()) {
                Some(case) => out.extend(apply_chain(&case.processors, &shell, part, false).await),
                None => out.push(part),
            }
        }
        Ok(collect(&shell, out))
    }

    fn name(&self) -> &str {
        "switch"
    }
}

#[cfg(test)]
#[path = "branch_test.rs"]
mod branch_test;
