//! SortGroup - Reassembling per-part outcomes after splits
//!
//! A sort group tags every part of a batch with its position at stamping
//! time. When a processor later splits, filters or re-batches the parts,
//! downstream components can recover the original index of any surviving
//! part and reassemble per-part acknowledgements in source order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{Batch, MessagePart};

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// Tag stored on a part, recording its index within one sort group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GroupTag {
    pub group: u64,
    pub index: usize,
}

/// A stamped snapshot of a batch's part ordering
#[derive(Debug)]
pub struct SortGroup {
    id: u64,
    len: usize,
}

impl SortGroup {
    /// Stamp a new sort group onto a batch
    ///
    /// Every part is tagged with its current index, and the group is
    /// recorded on the batch so downstream components can look it up.
    pub fn stamp(batch: &mut Batch) -> Arc<SortGroup> {
        let id = NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed);
        for (index, part) in batch.iter_mut().enumerate() {
            part.add_tag(GroupTag { group: id, index });
        }
        let group = Arc::new(SortGroup {
            id,
            len: batch.len(),
        });
        batch.push_sort_group(Arc::clone(&group));
        group
    }

    /// Recover the stamped index of a part, if it belongs to this group
    pub fn index_of(&self, part: &MessagePart) -> Option<usize> {
        part.tag_index(self.id)
    }

    /// Number of parts in the batch when the group was stamped
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the group was stamped on an empty batch
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
