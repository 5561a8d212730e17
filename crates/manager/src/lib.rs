//! Sluice - Manager
//!
//! The only shared-mutable store in the engine: named inputs, outputs,
//! processors, caches and rate limiters, each table guarded by a
//! read/write lock so hot-reload can replace a component without tearing
//! it out from under a concurrent user.
//!
//! # Access discipline
//!
//! `access_*` hands the caller's closure a handle to the component and
//! awaits the returned future while the table's read guard is held, so a
//! reload (`store_*`, write lock) blocks until every in-flight accessor
//! has finished. Reload is rare, readers are cheap, and no lock-free
//! scheme is attempted.
//!
//! The manager also owns the pipe table used by inproc components to hand
//! transaction edges across the graph, and dispenses the [`Environment`]
//! the config loader uses for `${VAR}` interpolation.

mod environment;
mod local_rate_limit;
mod memory_cache;

pub use environment::Environment;
pub use local_rate_limit::LocalRateLimit;
pub use memory_cache::MemoryCache;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use crossfire::{MAsyncRx, MAsyncTx};
use tokio::sync::RwLock;

use sluice_component::{Cache, Error, Input, Output, Processor, RateLimit, Result, Transaction};

/// Handle to an output stored as a named resource
///
/// Stored outputs are wired to their own edge when they are registered;
/// resource outputs elsewhere in the graph feed transactions through this
/// handle so that many references share one running component.
pub struct OutputHandle {
    tx: StdMutex<Option<MAsyncTx<Transaction>>>,
    inner: Box<dyn Output>,
}

impl OutputHandle {
    /// Forward a transaction to the stored output
    ///
    /// On failure the transaction is handed back so the caller can retry
    /// or ack it.
    pub async fn write_transaction(
        &self,
        transaction: Transaction,
    ) -> std::result::Result<(), (Transaction, Error)> {
        let tx = self.tx.lock().expect("output handle poisoned").clone();
        match tx {
            Some(tx) => tx
                .send(transaction)
                .await
                .map_err(|err| (err.0, Error::TypeClosed)),
            None => Err((transaction, Error::TypeClosed)),
        }
    }

    /// Whether the stored output reports connected
    pub fn connected(&self) -> bool {
        self.inner.connected()
    }

    fn release_edge(&self) {
        self.tx.lock().expect("output handle poisoned").take();
    }
}

/// Named, shared components with lifecycle and access locks
#[derive(Default)]
pub struct Manager {
    inputs: RwLock<HashMap<String, Arc<dyn Input>>>,
    outputs: RwLock<HashMap<String, Arc<OutputHandle>>>,
    processors: RwLock<HashMap<String, Arc<dyn Processor>>>,
    caches: RwLock<HashMap<String, Arc<dyn Cache>>>,
    rate_limits: RwLock<HashMap<String, Arc<dyn RateLimit>>>,

    pipes: StdMutex<HashMap<String, MAsyncRx<Transaction>>>,

    env: Environment,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").finish_non_exhaustive()
    }
}

impl Manager {
    /// Create an empty manager with a process-environment backed
    /// interpolation environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with an explicit interpolation environment
    pub fn with_environment(env: Environment) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }

    /// The interpolation environment dispensed to config loading
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    // ---- caches ------------------------------------------------------

    /// Whether a cache with this label exists
    pub async fn probe_cache(&self, label: &str) -> bool {
        self.caches.read().await.contains_key(label)
    }

    /// Run `f` against the cache while the table's read lock is held
    pub async fn access_cache<T, Fut>(
        &self,
        label: &str,
        f: impl FnOnce(Arc<dyn Cache>) -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = T>,
    {
        let guard = self.caches.read().await;
        let cache = guard
            .get(label)
            .ok_or_else(|| Error::ResourceNotFound(label.to_string()))?;
        Ok(f(Arc::clone(cache)).await)
    }

    /// Store or replace a cache under the write lock
    pub async fn store_cache(&self, label: impl Into<String>, cache: Arc<dyn Cache>) {
        self.caches.write().await.insert(label.into(), cache);
    }

    // ---- rate limits -------------------------------------------------

    /// Whether a rate limit with this label exists
    pub async fn probe_rate_limit(&self, label: &str) -> bool {
        self.rate_limits.read().await.contains_key(label)
    }

    /// Run `f` against the rate limit while the table's read lock is held
    pub async fn access_rate_limit<T, Fut>(
        &self,
        label: &str,
        f: impl FnOnce(Arc<dyn RateLimit>) -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = T>,
    {
        let guard = self.rate_limits.read().await;
        let limit = guard
            .get(label)
            .ok_or_else(|| Error::ResourceNotFound(label.to_string()))?;
        Ok(f(Arc::clone(limit)).await)
    }

    /// Store or replace a rate limit under the write lock
    pub async fn store_rate_limit(&self, label: impl Into<String>, limit: Arc<dyn RateLimit>) {
        self.rate_limits.write().await.insert(label.into(), limit);
    }

    // ---- processors --------------------------------------------------

    /// Whether a processor with this label exists
    pub async fn probe_processor(&self, label: &str) -> bool {
        self.processors.read().await.contains_key(label)
    }

    /// Run `f` against the processor while the table's read lock is held
    pub async fn access_processor<T, Fut>(
        &self,
        label: &str,
        f: impl FnOnce(Arc<dyn Processor>) -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = T>,
    {
        let guard = self.processors.read().await;
        let processor = guard
            .get(label)
            .ok_or_else(|| Error::ResourceNotFound(label.to_string()))?;
        Ok(f(Arc::clone(processor)).await)
    }

    /// Store or replace a processor under the write lock
    pub async fn store_processor(&self, label: impl Into<String>, processor: Arc<dyn Processor>) {
        self.processors.write().await.insert(label.into(), processor);
    }

    // ---- inputs ------------------------------------------------------

    /// Whether an input with this label exists
    pub async fn probe_input(&self, label: &str) -> bool {
        self.inputs.read().await.contains_key(label)
    }

    /// Run `f` against the input while the table's read lock is held
    pub async fn access_input<T, Fut>(
        &self,
        label: &str,
        f: impl FnOnce(Arc<dyn Input>) -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = T>,
    {
        let guard = self.inputs.read().await;
        let input = guard
            .get(label)
            .ok_or_else(|| Error::ResourceNotFound(label.to_string()))?;
        Ok(f(Arc::clone(input)).await)
    }

    /// Store or replace an input under the write lock
    pub async fn store_input(&self, label: impl Into<String>, input: Box<dyn Input>) {
        self.inputs.write().await.insert(label.into(), Arc::from(input));
    }

    /// Clone the outgoing edge of a stored input
    pub async fn input_rx(&self, label: &str) -> Result<MAsyncRx<Transaction>> {
        let guard = self.inputs.read().await;
        let input = guard
            .get(label)
            .ok_or_else(|| Error::ResourceNotFound(label.to_string()))?;
        Ok(input.transaction_rx())
    }

    /// Liveness probe of a stored input, `false` when absent
    ///
    /// Uses a non-blocking read so it can be called from sync contexts; a
    /// table busy being reloaded reports `true` (the replacement is
    /// expected to come up connected).
    pub fn input_connected(&self, label: &str) -> bool {
        match self.inputs.try_read() {
            Ok(guard) => guard.get(label).map(|i| i.connected()).unwrap_or(false),
            Err(_) => true,
        }
    }

    // ---- outputs -----------------------------------------------------

    /// Whether an output with this label exists
    pub async fn probe_output(&self, label: &str) -> bool {
        self.outputs.read().await.contains_key(label)
    }

    /// Store an output, wiring it to its own edge
    pub async fn store_output(
        &self,
        label: impl Into<String>,
        mut output: Box<dyn Output>,
    ) -> Result<()> {
        let (tx, rx) = sluice_component::edge();
        output.consume(rx)?;
        let handle = Arc::new(OutputHandle {
            tx: StdMutex::new(Some(tx)),
            inner: output,
        });
        self.outputs.write().await.insert(label.into(), handle);
        Ok(())
    }

    /// Run `f` against the output handle while the table's read lock is
    /// held
    pub async fn access_output<T, Fut>(
        &self,
        label: &str,
        f: impl FnOnce(Arc<OutputHandle>) -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = T>,
    {
        let guard = self.outputs.read().await;
        let handle = guard
            .get(label)
            .ok_or_else(|| Error::ResourceNotFound(label.to_string()))?;
        Ok(f(Arc::clone(handle)).await)
    }

    /// Forward a transaction to a stored output
    ///
    /// On failure the transaction is handed back with the error so the
    /// caller can retry without losing the pending ack.
    pub async fn write_to_output(
        &self,
        label: &str,
        transaction: Transaction,
    ) -> std::result::Result<(), (Transaction, Error)> {
        let guard = self.outputs.read().await;
        let Some(handle) = guard.get(label) else {
            return Err((transaction, Error::ResourceNotFound(label.to_string())));
        };
        handle.write_transaction(transaction).await
    }

    /// Liveness probe of a stored output, `false` when absent
    pub fn output_connected(&self, label: &str) -> bool {
        match self.outputs.try_read() {
            Ok(guard) => guard.get(label).map(|o| o.connected()).unwrap_or(false),
            Err(_) => true,
        }
    }

    // ---- pipes -------------------------------------------------------

    /// Register a named transaction edge
    pub fn set_pipe(&self, name: impl Into<String>, rx: MAsyncRx<Transaction>) {
        self.pipes
            .lock()
            .expect("pipe table poisoned")
            .insert(name.into(), rx);
    }

    /// Fetch a clone of a named transaction edge
    pub fn get_pipe(&self, name: &str) -> Result<MAsyncRx<Transaction>> {
        self.pipes
            .lock()
            .expect("pipe table poisoned")
            .get(name)
            .cloned()
            .ok_or(Error::PipeNotFound)
    }

    /// Remove a named transaction edge
    pub fn unset_pipe(&self, name: &str) {
        self.pipes.lock().expect("pipe table poisoned").remove(name);
    }

    // ---- lifecycle ---------------------------------------------------

    /// Shut down every stored resource
    ///
    /// Inputs close first, then outputs (their feeding edges are released
    /// with the handles), then processors release their resources.
    /// Components that fail to confirm within `timeout` are logged and
    /// abandoned.
    pub async fn close_resources(&self, timeout: Duration) {
        let inputs = std::mem::take(&mut *self.inputs.write().await);
        for (label, input) in inputs {
            input.close_at_leisure();
            if input.wait_for_close(timeout).await.is_err() {
                tracing::warn!(resource = %label, "input resource failed to close in time");
                input.close_now();
            }
        }

        let outputs = std::mem::take(&mut *self.outputs.write().await);
        for (label, handle) in outputs {
            handle.release_edge();
            handle.inner.close_at_leisure();
            if handle.inner.wait_for_close(timeout).await.is_err() {
                tracing::warn!(resource = %label, "output resource failed to close in time");
                handle.inner.close_now();
            }
        }

        let processors = std::mem::take(&mut *self.processors.write().await);
        for (label, processor) in processors {
            if let Err(err) = processor.close().await {
                tracing::warn!(resource = %label, error = %err, "processor resource close failed");
            }
        }

        self.pipes.lock().expect("pipe table poisoned").clear();
    }
}
