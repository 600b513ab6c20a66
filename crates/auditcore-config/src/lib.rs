// auditcore-config - unified pipeline configuration
//
// Sources, in priority order:
// 1. Environment variables (AUDITCORE_*)
// 2. Explicit config file path
// 3. Default config file location (./auditcore.toml)
// 4. Built-in defaults
//
// This crate only describes configuration; the orchestrator turns it into
// live components.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

mod sources;
mod validation;

pub use validation::validate_config;

/// Main pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub flush: FlushConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Ordered delivery chain; first entry is tried first.
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportConfig>,

    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Declarative schemas, resolved by an event's `schema_name`.
    #[serde(default)]
    pub schemas: Vec<SchemaConfig>,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_transports() -> Vec<TransportConfig> {
    vec![TransportConfig::Console {
        stream: ConsoleStreamConfig::Split,
    }]
}

// Derived Default would leave `transports` empty; the serde default
// attribute only applies when deserializing.
impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            buffer: BufferConfig::default(),
            flush: FlushConfig::default(),
            batch: BatchConfig::default(),
            memory: MemoryConfig::default(),
            breaker: BreakerConfig::default(),
            transports: default_transports(),
            sanitizer: SanitizerConfig::default(),
            fallback: FallbackConfig::default(),
            schemas: Vec::new(),
            log: LogConfig::default(),
        }
    }
}

/// Token-bucket admission on the ingest edge.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100.0,
            refill_per_sec: 50.0,
        }
    }
}

/// Bounded event buffer.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    pub capacity: usize,
    pub high_watermark: f64,
    pub low_watermark: f64,
    #[serde(default)]
    pub max_bytes: Option<usize>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            high_watermark: 0.8,
            low_watermark: 0.3,
            max_bytes: None,
        }
    }
}

/// Adaptive flush cadence bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct FlushConfig {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            max_interval_ms: 5000,
        }
    }
}

impl FlushConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

/// Adaptive batch sizing bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    pub base_size: usize,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            base_size: 100,
            min_size: 10,
            max_size: 1000,
        }
    }
}

/// Heap pressure thresholds and sampling cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub sample_interval_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 0.70,
            critical_threshold: 0.85,
            sample_interval_ms: 5000,
        }
    }
}

impl MemoryConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Per-transport circuit breaker tuning (shared by all transports).
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 60_000,
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// One entry in the delivery chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Http {
        endpoint: String,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
        #[serde(default = "default_http_retries")]
        retries: u32,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    File {
        path: String,
        #[serde(default)]
        max_bytes: Option<u64>,
    },
    Console {
        #[serde(default)]
        stream: ConsoleStreamConfig,
    },
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_http_retries() -> u32 {
    3
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Http { .. } => "http",
            TransportConfig::File { .. } => "file",
            TransportConfig::Console { .. } => "console",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStreamConfig {
    Stdout,
    Stderr,
    #[default]
    Split,
}

/// Redaction policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SanitizerConfig {
    pub max_depth: usize,
    #[serde(default)]
    pub sensitive_keys: Vec<String>,
    pub encoded_scan: bool,
    /// Redact contact identifiers (email, phone) in addition to
    /// credential-shaped keys.
    #[serde(default)]
    pub mask_contact_info: bool,
    pub max_message_len: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            sensitive_keys: Vec::new(),
            encoded_scan: true,
            mask_contact_info: false,
            max_message_len: 8192,
        }
    }
}

/// Bounded local queue for undeliverable events.
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    pub max_queue_size: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
        }
    }
}

/// One declarative schema.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<SchemaFieldConfig>,
}

/// One declared field of a schema.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFieldConfig {
    pub name: String,
    /// string, number, boolean, timestamp, mapping, sequence or any.
    #[serde(default = "default_field_kind")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<ScalarValue>,
    #[serde(default, rename = "enum")]
    pub enum_values: Option<Vec<ScalarValue>>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub coerce: bool,
}

fn default_field_kind() -> String {
    "any".to_string()
}

/// Scalar literal usable as a schema default or enum member.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Number(f64),
    String(String),
}

/// Diagnostics of the pipeline itself (the opt-in tracing subscriber).
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
