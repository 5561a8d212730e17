//! BatchError - Per-part failure accounting
//!
//! A structured error carrying the outcome of individual parts within a
//! batch, so that upstream retry logic can resend only the failed subset.

use std::fmt;

use crate::Batch;

/// Error carrying per-index failures for a source batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    source_len: usize,
    failed: Vec<(usize, String)>,
}

impl BatchError {
    /// Create an empty error for a batch of the given size
    pub fn new(source_len: usize) -> Self {
        Self {
            source_len,
            failed: Vec::new(),
        }
    }

    /// Record a failure for the part at `index`
    pub fn fail(&mut self, index: usize, reason: impl Into<String>) {
        debug_assert!(index < self.source_len, "failed index out of range");
        self.failed.push((index, reason.into()));
    }

    /// Number of failed parts
    #[inline]
    pub fn len(&self) -> usize {
        self.failed.len()
    }

    /// Check whether any part failed
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    /// Size of the batch the error was recorded against
    #[inline]
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// All recorded failures as `(index, reason)` pairs
    #[inline]
    pub fn failed(&self) -> &[(usize, String)] {
        &self.failed
    }

    /// Iterate over the failed indices
    pub fn failed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.failed.iter().map(|(i, _)| *i)
    }

    /// Build the retry subset: the failed parts of `source`, in order
    ///
    /// Indices outside the source batch are skipped; the returned batch
    /// keeps the source's sort groups and collapsed count.
    pub fn failed_batch(&self, source: &Batch) -> Batch {
        let parts = self
            .failed_indices()
            .filter_map(|i| source.get(i).cloned())
            .collect();
        source.with_parts(parts)
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failed.first() {
            Some((index, reason)) => write!(
                f,
                "{} of {} batch parts failed, first at index {}: {}",
                self.failed.len(),
                self.source_len,
                index,
                reason
            ),
            None => write!(f, "no batch parts failed"),
        }
    }
}

impl std::error::Error for BatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_batch_subset() {
        let source = Batch::from_payloads(["a", "b", "c", "d"]);

        let mut err = BatchError::new(source.len());
        err.fail(1, "bad json");
        err.fail(3, "mapping failed");

        let retry = err.failed_batch(&source);
        assert_eq!(retry.len(), 2);
        assert_eq!(retry.get(0).unwrap().as_bytes(), b"b");
        assert_eq!(retry.get(1).unwrap().as_bytes(), b"d");
    }

    #[test]
    fn test_display_mentions_first_failure() {
        let mut err = BatchError::new(3);
        err.fail(2, "boom");
        let text = err.to_string();
        assert!(text.contains("index 2"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_empty_error() {
        let err = BatchError::new(5);
        assert!(err.is_empty());
        assert_eq!(err.len(), 0);
        assert_eq!(err.failed_batch(&Batch::from_payloads(["x"])).len(), 0);
    }
}
