//! Stream controller
//!
//! Builds the graph from a validated configuration and drives its
//! coordinated shutdown.
//!
//! # Build order
//!
//! caches → rate limiters → processor resources → output resources →
//! output → pipeline → buffer → input resources → input. Resources come
//! up before anything that might reference them; the output side comes
//! up before the input side so the graph can never receive a transaction
//! it has nowhere to send.
//!
//! # Shutdown
//!
//! `stop` walks the reverse order with `close_at_leisure` and waits for
//! each component against a shared deadline; the data path drains
//! naturally because closing the input closes each downstream edge in
//! turn. On deadline it escalates to `close_now`, logs the components
//! that still refuse to confirm, and returns `Timeout`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;

use sluice_batcher::{Policy, PolicyConfig};
use sluice_buffer::{BufferAdapter, MemoryBuffer};
use sluice_component::{Error, Input, Output, Processor, Result};
use sluice_input::{FanInBroker, GenerateInput, GenerateConfig, InprocInput, ResourceInput};
use sluice_manager::{LocalRateLimit, Manager, MemoryCache};
use sluice_output::{
    BatchingOutput, DropOutput, FallbackBroker, FanOutBroker, GreedyBroker, InprocOutput,
    ResourceOutput, RoundRobinBroker, StdoutOutput, WriterConfig,
};
use sluice_pipeline::Pipeline;
use sluice_processor::{
    CatchProcessor, NoopProcessor, ResourceProcessor, SplitProcessor, SwitchCase,
    SwitchProcessor, TryProcessor,
};

use crate::config::{
    BrokerPattern, BufferConfig, CacheConfig, InputConfig, OutputConfig, ProcessorConfig,
    RateLimitConfig, StreamConfig, SwitchCaseConfig,
};

/// Grace period granted per component after escalation to close-now
const FORCED_CLOSE_GRACE: Duration = Duration::from_secs(3);

/// A running streaming graph
pub struct Stream {
    manager: Arc<Manager>,
    input: Box<dyn Input>,
    buffer: Option<BufferAdapter>,
    pipeline: Option<Pipeline>,
    output: Box<dyn Output>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

impl Stream {
    /// Build and start the graph described by `conf`
    ///
    /// Fails synchronously on any missing resource or double-start; a
    /// partially built graph is torn down by dropping it.
    pub async fn new(conf: StreamConfig, manager: Arc<Manager>) -> Result<Self> {
        // Resources first, so references resolve.
        for resource in &conf.cache_resources {
            let CacheConfig::Memory(mc) = &resource.cache;
            let ttl = mc.default_ttl_ms.map(Duration::from_millis);
            manager
                .store_cache(&resource.label, Arc::new(MemoryCache::new(ttl)))
                .await;
        }
        for resource in &conf.rate_limit_resources {
            let RateLimitConfig::Local(rl) = &resource.rate_limit;
            manager
                .store_rate_limit(
                    &resource.label,
                    Arc::new(LocalRateLimit::new(
                        rl.count,
                        Duration::from_millis(rl.interval_ms),
                    )),
                )
                .await;
        }
        for resource in &conf.processor_resources {
            let processor = build_processor(&resource.processor, &manager).await?;
            manager
                .store_processor(&resource.label, Arc::from(processor))
                .await;
        }
        for resource in &conf.output_resources {
            let output = build_output(&resource.output, &manager).await?;
            manager.store_output(&resource.label, output).await?;
        }

        // The main chain, sink side first.
        let mut output = build_output(&conf.output, &manager).await?;

        let mut pipeline = if conf.pipeline.processors.is_empty() {
            None
        } else {
            let mut processors = Vec::with_capacity(conf.pipeline.processors.len());
            for proc_conf in &conf.pipeline.processors {
                processors.push(build_processor(proc_conf, &manager).await?);
            }
            Some(Pipeline::new(conf.pipeline.threads, processors))
        };

        let mut buffer = conf.buffer.as_ref().map(|buffer_conf| match buffer_conf {
            BufferConfig::Memory(mb) => {
                BufferAdapter::new(Arc::new(MemoryBuffer::new(mb.limit_bytes)))
            }
        });

        for resource in &conf.input_resources {
            let input = build_input(&resource.input, &manager).await?;
            manager.store_input(&resource.label, input).await;
        }
        let input = build_input(&conf.input, &manager).await?;

        // Wire the edges: input -> (buffer) -> (pipeline) -> output.
        let mut rx = input.transaction_rx();
        if let Some(buffer) = buffer.as_mut() {
            buffer.consume(rx)?;
            rx = buffer.transaction_rx();
        }
        if let Some(pipeline) = pipeline.as_mut() {
            pipeline.consume(rx)?;
            rx = pipeline.transaction_rx();
        }
        output.consume(rx)?;

        tracing::info!(
            buffered = buffer.is_some(),
            pipelined = pipeline.is_some(),
            "stream running"
        );

        Ok(Self {
            manager,
            input,
            buffer,
            pipeline,
            output,
        })
    }

    /// Whether every component of the main chain reports connected
    pub fn connected(&self) -> bool {
        self.input.connected() && self.output.connected()
    }

    /// The resource manager this stream was built against
    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    /// Drain and shut the graph down
    ///
    /// All pending acknowledgements drain before the graceful path
    /// returns. When `timeout` expires the remaining components are told
    /// to close immediately; a component that still fails to confirm is
    /// logged and abandoned.
    pub async fn stop(self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "stream stopping");

        self.input.close_at_leisure();

        let mut timed_out = false;
        if self.input.wait_for_close(remaining(deadline)).await.is_err() {
            timed_out = true;
        }
        if !timed_out {
            if let Some(buffer) = &self.buffer {
                buffer.close_at_leisure();
                timed_out = buffer.wait_for_close(remaining(deadline)).await.is_err();
            }
        }
        if !timed_out {
            if let Some(pipeline) = &self.pipeline {
                pipeline.close_at_leisure();
                timed_out = pipeline.wait_for_close(remaining(deadline)).await.is_err();
            }
        }
        if !timed_out {
            self.output.close_at_leisure();
            timed_out = self.output.wait_for_close(remaining(deadline)).await.is_err();
        }

        if timed_out {
            tracing::warn!("graceful drain exceeded its deadline, forcing shutdown");
            self.input.close_now();
            if let Some(buffer) = &self.buffer {
                buffer.close_now();
            }
            if let Some(pipeline) = &self.pipeline {
                pipeline.close_now();
            }
            self.output.close_now();

            let mut unconfirmed = Vec::new();
            if self.input.wait_for_close(FORCED_CLOSE_GRACE).await.is_err() {
                unconfirmed.push("input");
            }
            if let Some(buffer) = &self.buffer {
                if buffer.wait_for_close(FORCED_CLOSE_GRACE).await.is_err() {
                    unconfirmed.push("buffer");
                }
            }
            if let Some(pipeline) = &self.pipeline {
                if pipeline.wait_for_close(FORCED_CLOSE_GRACE).await.is_err() {
                    unconfirmed.push("pipeline");
                }
            }
            if self.output.wait_for_close(FORCED_CLOSE_GRACE).await.is_err() {
                unconfirmed.push("output");
            }
            if !unconfirmed.is_empty() {
                tracing::error!(?unconfirmed, "components failed to confirm closure");
            }

            self.manager.close_resources(FORCED_CLOSE_GRACE).await;
            return Err(Error::Timeout);
        }

        self.manager
            .close_resources(remaining(deadline).max(FORCED_CLOSE_GRACE))
            .await;
        tracing::info!("stream stopped");
        Ok(())
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Build an input component, recursing through brokers
fn build_input<'a>(
    conf: &'a InputConfig,
    manager: &'a Arc<Manager>,
) -> BoxFuture<'a, Result<Box<dyn Input>>> {
    Box::pin(async move {
        let input: Box<dyn Input> = match conf {
            InputConfig::Generate(gc) => Box::new(GenerateInput::new(GenerateConfig {
                payload: gc.payload.clone(),
                interval: Duration::from_millis(gc.interval_ms),
                count: gc.count,
                batch_size: gc.batch_size,
            })),
            InputConfig::Inproc(name) => {
                Box::new(InprocInput::new(name.clone(), Arc::clone(manager)))
            }
            InputConfig::Resource(label) => {
                Box::new(ResourceInput::new(label.clone(), Arc::clone(manager)).await?)
            }
            InputConfig::Broker(broker) => {
                let mut children = Vec::with_capacity(broker.inputs.len());
                for child in &broker.inputs {
                    children.push(build_input(child, manager).await?);
                }
                Box::new(FanInBroker::new(children))
            }
        };
        Ok(input)
    })
}

/// Build an output component, recursing through brokers
fn build_output<'a>(
    conf: &'a OutputConfig,
    manager: &'a Arc<Manager>,
) -> BoxFuture<'a, Result<Box<dyn Output>>> {
    Box::pin(async move {
        let output: Box<dyn Output> = match conf {
            OutputConfig::Stdout(sc) => {
                let writer_conf = WriterConfig {
                    max_in_flight: sc.max_in_flight,
                    max_retries: sc.max_retries,
                    retry_as_batch: sc.retry_as_batch,
                    ..Default::default()
                };
                let inner: Box<dyn Output> = Box::new(StdoutOutput::new(writer_conf));
                match &sc.batching {
                    Some(bc) => {
                        let policy = Policy::new(PolicyConfig {
                            count: bc.count,
                            byte_size: bc.byte_size,
                            period: bc.period_ms.map(Duration::from_millis),
                        });
                        Box::new(BatchingOutput::new(inner, policy)?)
                    }
                    None => inner,
                }
            }
            OutputConfig::Drop(_) => Box::new(DropOutput::new()),
            OutputConfig::Inproc(name) => {
                Box::new(InprocOutput::new(name.clone(), Arc::clone(manager)))
            }
            OutputConfig::Resource(label) => {
                Box::new(ResourceOutput::new(label.clone(), Arc::clone(manager)).await?)
            }
            OutputConfig::Broker(broker) => {
                let mut children = Vec::with_capacity(broker.outputs.len());
                for child in &broker.outputs {
                    children.push(build_output(child, manager).await?);
                }
                match broker.pattern {
                    BrokerPattern::FanOut => Box::new(FanOutBroker::new(children)?),
                    BrokerPattern::RoundRobin => Box::new(RoundRobinBroker::new(children)?),
                    BrokerPattern::Greedy => Box::new(GreedyBroker::new(children)?),
                    BrokerPattern::Fallback => Box::new(FallbackBroker::new(children)?),
                }
            }
        };
        Ok(output)
    })
}

/// Build a processor component, recursing through branch processors
fn build_processor<'a>(
    conf: &'a ProcessorConfig,
    manager: &'a Arc<Manager>,
) -> BoxFuture<'a, Result<Box<dyn Processor>>> {
    Box::pin(async move {
        let processor: Box<dyn Processor> = match conf {
            ProcessorConfig::Noop(_) => Box::new(NoopProcessor),
            ProcessorConfig::Split(sc) => Box::new(SplitProcessor::new(sc.size)),
            ProcessorConfig::Try(children) => {
                Box::new(TryProcessor::new(build_processors(children, manager).await?))
            }
            ProcessorConfig::Catch(children) => {
                Box::new(CatchProcessor::new(build_processors(children, manager).await?))
            }
            ProcessorConfig::Switch(cases) => {
                let mut built = Vec::with_capacity(cases.len());
                for SwitchCaseConfig { errored, processors } in cases {
                    built.push(SwitchCase {
                        errored: *errored,
                        processors: build_processors(processors, manager).await?,
                    });
                }
                Box::new(SwitchProcessor::new(built))
            }
            ProcessorConfig::Resource(label) => {
                Box::new(ResourceProcessor::new(label.clone(), Arc::clone(manager)).await?)
            }
        };
        Ok(processor)
    })
}

async fn build_processors(
    confs: &[ProcessorConfig],
    manager: &Arc<Manager>,
) -> Result<Vec<Box<dyn Processor>>> {
    let mut processors = Vec::with_capacity(confs.len());
    for conf in confs {
        processors.push(build_processor(conf, manager).await?);
    }
    Ok(processors)
}
