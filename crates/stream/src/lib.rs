//! Sluice - Stream
//!
//! Turns a declarative configuration document into a running streaming
//! graph: `input → (buffer) → pipeline → output`, plus the named
//! resources the graph references. The controller owns startup order and
//! the coordinated two-phase shutdown.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sluice_manager::Manager;
//! use sluice_stream::{Stream, StreamConfig};
//!
//! let manager = Arc::new(Manager::new());
//! let conf = StreamConfig::from_str_interpolated(
//!     r#"
//!     [input.generate]
//!     payload = "hello"
//!     interval_ms = 1000
//!
//!     [output.stdout]
//!     "#,
//!     manager.environment(),
//! )?;
//! let stream = Stream::new(conf, manager).await?;
//! // ... run until a stop signal ...
//! stream.stop(std::time::Duration::from_secs(20)).await?;
//! ```

mod config;
mod stream;

pub use config::{
    BrokerPattern, BufferConfig, CacheConfig, ConfigError, DropOutputConfig,
    GenerateInputConfig, InputBrokerConfig, InputConfig, LabelledCache, LabelledInput,
    LabelledOutput, LabelledProcessor, LabelledRateLimit, LocalRateLimitConfig,
    MemoryBufferConfig, MemoryCacheConfig, NoopConfig, OutputBatchingConfig,
    OutputBrokerConfig, OutputConfig, PipelineConfig, ProcessorConfig, RateLimitConfig,
    SplitConfig, StdoutOutputConfig, StreamConfig, SwitchCaseConfig,
};
pub use stream::Stream;
