//! Batch - The atomic unit of work
//!
//! An ordered sequence of message parts, carried whole along every graph
//! edge. Batches additionally track the sort groups stamped on them and an
//! optional collapsed count so that acknowledgement accounting can reflect
//! a batch's size before archive-style processors collapsed it.

use std::sync::Arc;

use bytes::Bytes;

use crate::{MessagePart, SortGroup};

/// Ordered group of message parts treated atomically
#[derive(Debug, Clone, Default)]
pub struct Batch {
    parts: Vec<MessagePart>,

    /// Sort groups stamped on this batch, oldest first
    sort_groups: Vec<Arc<SortGroup>>,

    /// Part count before a processor collapsed the batch (archive,
    /// concatenate and similar); `None` when the batch was never collapsed
    collapsed_count: Option<usize>,
}

impl Batch {
    /// Create a batch from parts
    pub fn new(parts: Vec<MessagePart>) -> Self {
        Self {
            parts,
            sort_groups: Vec::new(),
            collapsed_count: None,
        }
    }

    /// Create a batch of single-payload parts, mostly useful in tests
    pub fn from_payloads<I, B>(payloads: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self::new(payloads.into_iter().map(MessagePart::new).collect())
    }

    /// Number of parts in the batch
    #[inline]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Check whether the batch has no parts
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Get a part by index
    #[inline]
    pub fn get(&self, index: usize) -> Option<&MessagePart> {
        self.parts.get(index)
    }

    /// Get a mutable part by index
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut MessagePart> {
        self.parts.get_mut(index)
    }

    /// Append a part
    pub fn push(&mut self, part: MessagePart) {
        self.parts.push(part);
    }

    /// Iterate over parts
    pub fn iter(&self) -> std::slice::Iter<'_, MessagePart> {
        self.parts.iter()
    }

    /// Iterate mutably over parts
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, MessagePart> {
        self.parts.iter_mut()
    }

    /// Consume the batch, returning its parts
    pub fn into_parts(self) -> Vec<MessagePart> {
        self.parts
    }

    /// Build a batch with the given parts but this batch's sort groups and
    /// collapsed count
    ///
    /// Used by processors that replace or filter parts while keeping the
    /// batch's ack-accounting context intact.
    pub fn with_parts(&self, parts: Vec<MessagePart>) -> Batch {
        Batch {
            parts,
            sort_groups: self.sort_groups.clone(),
            collapsed_count: self.collapsed_count,
        }
    }

    /// Produce an ack-independent duplicate of this batch
    ///
    /// Parts are copy-on-write, so the duplicate is cheap and mutations on
    /// either side stay isolated. Brokers use this for fan-out.
    pub fn copy(&self) -> Batch {
        self.clone()
    }

    /// Sort groups stamped on this batch, oldest first
    #[inline]
    pub fn sort_groups(&self) -> &[Arc<SortGroup>] {
        &self.sort_groups
    }

    pub(crate) fn push_sort_group(&mut self, group: Arc<SortGroup>) {
        self.sort_groups.push(group);
    }

    /// The part count before the batch was collapsed, if it was
    #[inline]
    pub fn collapsed_count(&self) -> Option<usize> {
        self.collapsed_count
    }

    /// Record the pre-collapse part count
    pub fn set_collapsed_count(&mut self, count: usize) {
        self.collapsed_count = Some(count);
    }

    /// The part count acknowledgement accounting should use
    ///
    /// Returns the collapsed count when set, so upstream accounting still
    /// reflects the original batch size after archive-style processors
    /// merged parts.
    #[inline]
    pub fn ack_len(&self) -> usize {
        self.collapsed_count.unwrap_or(self.parts.len())
    }

    /// Total payload bytes across all parts
    pub fn total_bytes(&self) -> usize {
        self.parts.iter().map(MessagePart::len).sum()
    }
}

impl IntoIterator for Batch {
    type Item = MessagePart;
    type IntoIter = std::vec::IntoIter<MessagePart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

impl FromIterator<MessagePart> for Batch {
    fn from_iter<T: IntoIterator<Item = MessagePart>>(iter: T) -> Self {
        Batch::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
