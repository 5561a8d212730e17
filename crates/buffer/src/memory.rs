//! In-memory FIFO buffer

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use sluice_component::{Error, Result};
use sluice_message::Batch;

use crate::{BufferReaderWriter, BufferedBatch, CommitFn};

/// Default capacity: 512 MiB of payload bytes
pub const DEFAULT_LIMIT_BYTES: usize = 512 * 1024 * 1024;

struct State {
    queue: VecDeque<Batch>,
    bytes: usize,
    ended: bool,
    closed: bool,
}

struct Inner {
    state: Mutex<State>,
    limit: usize,
    writable: Notify,
    readable: Notify,
}

/// Byte-bounded in-memory FIFO
///
/// Writes block once the payload-byte limit is reached (a single
/// over-limit batch is still accepted into an empty buffer so progress is
/// always possible). A failed downstream ack requeues the batch at the
/// front, preserving delivery order.
pub struct MemoryBuffer {
    inner: Arc<Inner>,
}

impl MemoryBuffer {
    pub fn new(limit_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    bytes: 0,
                    ended: false,
                    closed: false,
                }),
                limit: limit_bytes.max(1),
                writable: Notify::new(),
                readable: Notify::new(),
            }),
        }
    }

    /// Bytes currently queued
    pub fn bytes(&self) -> usize {
        self.inner.state.lock().expect("buffer poisoned").bytes
    }

    /// Batches currently queued
    pub fn len(&self) -> usize {
        self.inner.state.lock().expect("buffer poisoned").queue.len()
    }

    /// Whether the buffer holds no batches
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT_BYTES)
    }
}

#[async_trait]
impl BufferReaderWriter for MemoryBuffer {
    async fn write(&self, batch: Batch) -> Result<()> {
        let size = batch.total_bytes();
        loop {
            let wait = self.inner.writable.notified();
            {
                let mut state = self.inner.state.lock().expect("buffer poisoned");
                if state.closed {
                    return Err(Error::TypeClosed);
                }
                if state.queue.is_empty() || state.bytes + size <= self.inner.limit {
                    state.bytes += size;
                    state.queue.push_back(batch);
                    self.inner.readable.notify_one();
                    return Ok(());
                }
            }
            wait.await;
        }
    }

    async fn read(&self) -> Result<BufferedBatch> {
        loop {
            let wait = self.inner.readable.notified();
            {
                let mut state = self.inner.state.lock().expect("buffer poisoned");
                if state.closed {
                    return Err(Error::TypeClosed);
                }
                if let Some(batch) = state.queue.pop_front() {
                    state.bytes -= batch.total_bytes();
                    self.inner.writable.notify_waiters();

                    let inner = Arc::clone(&self.inner);
                    let requeue = batch.clone();
                    let commit: CommitFn = Box::new(move |res| {
                        Box::pin(async move {
                            if res.is_err() {
                                let mut state =
                                    inner.state.lock().expect("buffer poisoned");
                                state.bytes += requeue.total_bytes();
                                state.queue.push_front(requeue);
                                inner.readable.notify_one();
                            }
                        })
                    });
                    return Ok(BufferedBatch { batch, commit });
                }
                if state.ended {
                    return Err(Error::TypeClosed);
                }
            }
            wait.await;
        }
    }

    fn end_of_input(&self) {
        let mut state = self.inner.state.lock().expect("buffer poisoned");
        state.ended = true;
        self.inner.readable.notify_waiters();
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.inner.state.lock().expect("buffer poisoned");
        state.closed = true;
        state.queue.clear();
        state.bytes = 0;
        self.inner.readable.notify_waiters();
        self.inner.writable.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
