//! MessagePart - Copy-on-write message payload with metadata
//!
//! A part is an opaque byte payload plus a string metadata map, a lazily
//! populated structured (JSON) view, a failure annotation and the tracing
//! span it was created under.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::Span;

use crate::sort_group::GroupTag;

/// A single message payload flowing through the engine
///
/// Cloning is O(1): the payload is reference-counted `Bytes` and the
/// metadata map is shared until one copy writes to it. Mutating a clone
/// never affects the part it was cloned from.
#[derive(Debug, Clone)]
pub struct MessagePart {
    /// Raw payload bytes
    data: Bytes,

    /// String metadata, shared until written
    metadata: Arc<HashMap<String, String>>,

    /// Cached structured view of the payload, populated on first access
    structured: Option<Arc<Value>>,

    /// Failure annotation set by processors, routed by error-branch
    /// processors and surfaced at outputs
    failure: Option<Arc<str>>,

    /// Tracing span the part was produced under
    span: Span,

    /// Sort-group tags recording the part's position in stamped batches
    tags: Arc<Vec<GroupTag>>,
}

impl Default for MessagePart {
    fn default() -> Self {
        Self {
            data: Bytes::new(),
            metadata: Arc::new(HashMap::new()),
            structured: None,
            failure: None,
            span: Span::none(),
            tags: Arc::new(Vec::new()),
        }
    }
}

impl MessagePart {
    /// Create a part from raw payload bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            span: Span::current(),
            ..Self::default()
        }
    }

    /// Get the payload as a byte slice
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get a reference-counted handle to the payload
    #[inline]
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Payload length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replace the payload, invalidating the cached structured view
    pub fn set_bytes(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
        self.structured = None;
    }

    /// Get the structured (JSON) view of the payload
    ///
    /// The payload is parsed on first access and the result is cached until
    /// the payload is rewritten.
    pub fn structured(&mut self) -> Result<&Value, serde_json::Error> {
        if self.structured.is_none() {
            let value: Value = serde_json::from_slice(&self.data)?;
            self.structured = Some(Arc::new(value));
        }
        Ok(self.structured.as_deref().expect("structured cache populated"))
    }

    /// Get the cached structured view, if the payload has been parsed
    #[inline]
    pub fn structured_cached(&self) -> Option<&Value> {
        self.structured.as_deref()
    }

    /// Replace the payload with a structured value
    ///
    /// The value is serialised immediately so the raw and structured views
    /// stay consistent.
    pub fn set_structured(&mut self, value: Value) -> Result<(), serde_json::Error> {
        self.data = Bytes::from(serde_json::to_vec(&value)?);
        self.structured = Some(Arc::new(value));
        Ok(())
    }

    /// Get a metadata value
    #[inline]
    pub fn meta_get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Set a metadata value
    pub fn meta_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        Arc::make_mut(&mut self.metadata).insert(key.into(), value.into());
    }

    /// Remove a metadata value, returning it if present
    pub fn meta_remove(&mut self, key: &str) -> Option<String> {
        Arc::make_mut(&mut self.metadata).remove(key)
    }

    /// Iterate over all metadata entries
    pub fn meta_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Annotate this part as failed
    ///
    /// Failed parts keep flowing; error-branch processors route on the
    /// annotation and outputs surface it.
    pub fn set_failed(&mut self, reason: impl AsRef<str>) {
        self.failure = Some(Arc::from(reason.as_ref()));
    }

    /// Get the failure annotation, if any
    #[inline]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Check whether this part carries a failure annotation
    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Clear the failure annotation
    pub fn clear_failed(&mut self) {
        self.failure = None;
    }

    /// The span this part was produced under
    #[inline]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Replace the part's span
    pub fn set_span(&mut self, span: Span) {
        self.span = span;
    }

    pub(crate) fn add_tag(&mut self, tag: GroupTag) {
        Arc::make_mut(&mut self.tags).push(tag);
    }

    pub(crate) fn tag_index(&self, group: u64) -> Option<usize> {
        self.tags
            .iter()
            .rev()
            .find(|t| t.group == group)
            .map(|t| t.index)
    }
}

impl From<&str> for MessagePart {
    fn from(value: &str) -> Self {
        Self::new(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<Vec<u8>> for MessagePart {
    fn from(value: Vec<u8>) -> Self {
        Self::new(Bytes::from(value))
    }
}

#[cfg(test)]
#[path = "part_test.rs"]
mod part_test;
