//! Stream configuration
//!
//! TOML-based configuration describing all four layers of a stream plus
//! named resources. Components are tagged unions keyed by their type
//! name; `${VAR}` / `${VAR:default}` references are expanded against the
//! interpolation environment before parsing.
//!
//! # Example
//!
//! ```toml
//! [input.broker]
//! [[input.broker.inputs]]
//! [input.broker.inputs.generate]
//! payload = "from A"
//!
//! [[input.broker.inputs]]
//! [input.broker.inputs.generate]
//! payload = "from B"
//!
//! [pipeline]
//! threads = 2
//! processors = [{ split = { size = 10 } }]
//!
//! [output.broker]
//! pattern = "fan_out"
//! outputs = [{ stdout = {} }, { drop = {} }]
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use sluice_manager::Environment;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Environment variable interpolation failed
    #[error("interpolation failed: {0}")]
    Interpolation(String),

    /// Document is not valid TOML for this schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Document parsed but violates a semantic rule
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A complete stream definition
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    pub input: InputConfig,

    #[serde(default)]
    pub buffer: Option<BufferConfig>,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    pub output: OutputConfig,

    #[serde(default)]
    pub input_resources: Vec<LabelledInput>,

    #[serde(default)]
    pub output_resources: Vec<LabelledOutput>,

    #[serde(default)]
    pub processor_resources: Vec<LabelledProcessor>,

    #[serde(default)]
    pub cache_resources: Vec<LabelledCache>,

    #[serde(default)]
    pub rate_limit_resources: Vec<LabelledRateLimit>,
}

impl StreamConfig {
    /// Load from a TOML file, expanding `${VAR}` references
    pub fn from_file<P: AsRef<Path>>(path: P, env: &Environment) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str_interpolated(&raw, env)
    }

    /// Parse from a TOML string, expanding `${VAR}` references
    pub fn from_str_interpolated(raw: &str, env: &Environment) -> Result<Self> {
        let expanded = env
            .interpolate(raw)
            .map_err(|err| ConfigError::Interpolation(err.to_string()))?;
        let conf: StreamConfig = toml::from_str(&expanded)?;
        conf.validate()?;
        Ok(conf)
    }

    /// Check semantic rules the schema cannot express
    pub fn validate(&self) -> Result<()> {
        self.input.validate()?;
        self.output.validate()?;
        self.pipeline.validate()?;

        check_unique_labels("input_resources", self.input_resources.iter().map(|r| &r.label))?;
        check_unique_labels(
            "output_resources",
            self.output_resources.iter().map(|r| &r.label),
        )?;
        check_unique_labels(
            "processor_resources",
            self.processor_resources.iter().map(|r| &r.label),
        )?;
        check_unique_labels("cache_resources", self.cache_resources.iter().map(|r| &r.label))?;
        check_unique_labels(
            "rate_limit_resources",
            self.rate_limit_resources.iter().map(|r| &r.label),
        )?;

        for resource in &self.input_resources {
            resource.input.validate()?;
        }
        for resource in &self.output_resources {
            resource.output.validate()?;
        }
        for resource in &self.processor_resources {
            resource.processor.validate()?;
        }
        for resource in &self.rate_limit_resources {
            let RateLimitConfig::Local(conf) = &resource.rate_limit;
            if conf.count == 0 {
                return Err(ConfigError::Validation(format!(
                    "rate limit '{}': count must be at least 1",
                    resource.label
                )));
            }
            if conf.interval_ms == 0 {
                return Err(ConfigError::Validation(format!(
                    "rate limit '{}': interval_ms must be at least 1",
                    resource.label
                )));
            }
        }
        Ok(())
    }
}

fn check_unique_labels<'a>(
    table: &str,
    labels: impl Iterator<Item = &'a String>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for label in labels {
        if label.is_empty() {
            return Err(ConfigError::Validation(format!(
                "{table}: resource labels must not be empty"
            )));
        }
        if !seen.insert(label) {
            return Err(ConfigError::Validation(format!(
                "{table}: duplicate label '{label}'"
            )));
        }
    }
    Ok(())
}

// ---- inputs ----------------------------------------------------------

/// Input component, tagged by type name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum InputConfig {
    /// Synthetic batches on an interval
    Generate(GenerateInputConfig),

    /// Consume a named in-process pipe
    Inproc(String),

    /// Reference an input resource by label
    Resource(String),

    /// Multiplex several inputs into one
    Broker(InputBrokerConfig),
}

impl InputConfig {
    fn validate(&self) -> Result<()> {
        match self {
            InputConfig::Generate(_) => Ok(()),
            InputConfig::Inproc(name) | InputConfig::Resource(name) => {
                if name.is_empty() {
                    return Err(ConfigError::Validation(
                        "input: name must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            InputConfig::Broker(broker) => {
                if broker.inputs.is_empty() {
                    return Err(ConfigError::Validation(
                        "input broker: at least one child input is required".to_string(),
                    ));
                }
                broker.inputs.iter().try_for_each(InputConfig::validate)
            }
        }
    }
}

/// Settings for the generate input
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateInputConfig {
    #[serde(default)]
    pub payload: String,

    #[serde(default = "default_generate_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub count: usize,

    #[serde(default = "default_one")]
    pub batch_size: usize,
}

fn default_generate_interval_ms() -> u64 {
    1000
}

fn default_one() -> usize {
    1
}

/// Child list of an input broker (fan-in)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputBrokerConfig {
    pub inputs: Vec<InputConfig>,
}

// ---- pipeline --------------------------------------------------------

/// The processor stage definition
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Worker count; above 1 gives up cross-batch ordering
    #[serde(default = "default_one")]
    pub threads: usize,

    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            processors: Vec::new(),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(ConfigError::Validation(
                "pipeline: threads must be at least 1".to_string(),
            ));
        }
        self.processors.iter().try_for_each(ProcessorConfig::validate)
    }
}

/// Processor component, tagged by type name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ProcessorConfig {
    /// Pass batches through unchanged
    Noop(NoopConfig),

    /// Re-batch into chunks of at most `size` parts
    Split(SplitConfig),

    /// Apply children, skipping parts that already failed
    Try(Vec<ProcessorConfig>),

    /// Apply children only to failed parts, then clear their flags
    Catch(Vec<ProcessorConfig>),

    /// Route each part to the first case matching its failure state
    Switch(Vec<SwitchCaseConfig>),

    /// Reference a processor resource by label
    Resource(String),
}

impl ProcessorConfig {
    fn validate(&self) -> Result<()> {
        match self {
            ProcessorConfig::Noop(_) => Ok(()),
            ProcessorConfig::Split(conf) => {
                if conf.size == 0 {
                    return Err(ConfigError::Validation(
                        "split: size must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
            ProcessorConfig::Try(children) | ProcessorConfig::Catch(children) => {
                children.iter().try_for_each(ProcessorConfig::validate)
            }
            ProcessorConfig::Switch(cases) => cases
                .iter()
                .flat_map(|c| c.processors.iter())
                .try_for_each(ProcessorConfig::validate),
            ProcessorConfig::Resource(name) => {
                if name.is_empty() {
                    return Err(ConfigError::Validation(
                        "processor: resource name must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Empty settings table for the noop processor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoopConfig {}

/// Settings for the split processor
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    pub size: usize,
}

/// One case of a switch processor
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchCaseConfig {
    /// Match parts whose failure state equals this flag
    #[serde(default)]
    pub errored: bool,

    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,
}

// ---- outputs ---------------------------------------------------------

/// Output component, tagged by type name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum OutputConfig {
    /// Newline-delimited parts on standard output
    Stdout(StdoutOutputConfig),

    /// Discard batches, acking success
    Drop(DropOutputConfig),

    /// Publish the incoming edge as a named in-process pipe
    Inproc(String),

    /// Reference an output resource by label
    Resource(String),

    /// Compose child outputs under a broker pattern
    Broker(OutputBrokerConfig),
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        match self {
            OutputConfig::Stdout(_) | OutputConfig::Drop(_) => Ok(()),
            OutputConfig::Inproc(name) | OutputConfig::Resource(name) => {
                if name.is_empty() {
                    return Err(ConfigError::Validation(
                        "output: name must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            OutputConfig::Broker(broker) => {
                if broker.outputs.is_empty() {
                    return Err(ConfigError::Validation(
                        "output broker: at least one child output is required".to_string(),
                    ));
                }
                broker.outputs.iter().try_for_each(OutputConfig::validate)
            }
        }
    }
}

/// Settings for the stdout output
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdoutOutputConfig {
    #[serde(default = "default_one")]
    pub max_in_flight: usize,

    #[serde(default)]
    pub max_retries: usize,

    #[serde(default)]
    pub retry_as_batch: bool,

    #[serde(default)]
    pub batching: Option<OutputBatchingConfig>,
}

/// Empty settings table for the drop output
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropOutputConfig {}

/// Batching triggers attached to an output
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputBatchingConfig {
    #[serde(default)]
    pub count: usize,

    #[serde(default)]
    pub byte_size: usize,

    #[serde(default)]
    pub period_ms: Option<u64>,
}

/// Broker pattern and child list
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputBrokerConfig {
    pub pattern: BrokerPattern,
    pub outputs: Vec<OutputConfig>,
}

/// How an output broker distributes transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerPattern {
    FanOut,
    RoundRobin,
    Greedy,
    Fallback,
}

// ---- buffer ----------------------------------------------------------

/// Buffer component, tagged by type name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum BufferConfig {
    /// Byte-bounded in-memory FIFO
    Memory(MemoryBufferConfig),
}

/// Settings for the memory buffer
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryBufferConfig {
    #[serde(default = "default_buffer_limit")]
    pub limit_bytes: usize,
}

fn default_buffer_limit() -> usize {
    sluice_buffer::DEFAULT_LIMIT_BYTES
}

// ---- resources -------------------------------------------------------

/// A labelled input resource
#[derive(Debug, Clone, Deserialize)]
pub struct LabelledInput {
    pub label: String,
    #[serde(flatten)]
    pub input: InputConfig,
}

/// A labelled output resource
#[derive(Debug, Clone, Deserialize)]
pub struct LabelledOutput {
    pub label: String,
    #[serde(flatten)]
    pub output: OutputConfig,
}

/// A labelled processor resource
#[derive(Debug, Clone, Deserialize)]
pub struct LabelledProcessor {
    pub label: String,
    #[serde(flatten)]
    pub processor: ProcessorConfig,
}

/// A labelled cache resource
#[derive(Debug, Clone, Deserialize)]
pub struct LabelledCache {
    pub label: String,
    #[serde(flatten)]
    pub cache: CacheConfig,
}

/// A labelled rate limit resource
#[derive(Debug, Clone, Deserialize)]
pub struct LabelledRateLimit {
    pub label: String,
    #[serde(flatten)]
    pub rate_limit: RateLimitConfig,
}

/// Cache component, tagged by type name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum CacheConfig {
    /// TTL-aware in-memory cache
    Memory(MemoryCacheConfig),
}

/// Settings for the memory cache
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryCacheConfig {
    /// Default entry lifetime; unset entries never expire
    #[serde(default)]
    pub default_ttl_ms: Option<u64>,
}

/// Rate limit component, tagged by type name
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum RateLimitConfig {
    /// Fixed-window, process-local rate limit
    Local(LocalRateLimitConfig),
}

/// Settings for the local rate limit
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalRateLimitConfig {
    pub count: usize,
    pub interval_ms: u64,
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
