//! auditcore - embedded audit-logging pipeline
//!
//! The path from a `log(level, message, fields)` call to bytes at a remote
//! sink: token-bucket admission, PII sanitization, schema validation, a
//! bounded buffer with adaptive flushing, and an ordered transport chain
//! with per-transport circuit breakers and a local fallback queue.
//!
//! ```no_run
//! use auditcore::{fields, Level, Pipeline, RuntimeConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = Pipeline::init(RuntimeConfig::default())?;
//! pipeline
//!     .log(Level::Info, "user login", fields! { "user" => "alice" })
//!     .await;
//! pipeline.shutdown(std::time::Duration::from_secs(5)).await;
//! # Ok(())
//! # }
//! ```

mod dispatch;
mod pipeline;
mod schemas;
mod stats;
mod trace;

pub use pipeline::{LogOutcome, LogRecord, Pipeline, PipelineBuilder};
pub use stats::{BufferStats, FallbackStats, MemoryStats, PipelineStats};
pub use trace::{current_trace_context, with_trace_context, TraceContext};

// The vocabulary callers need without reaching into member crates.
pub use auditcore_buffer::{FixedMemorySource, MemorySource, PressureLevel, ProcMemorySource};
pub use auditcore_config::{
    LogConfig, LogFormat, RuntimeConfig, ScalarValue, SchemaConfig, SchemaFieldConfig,
    TransportConfig,
};
pub use auditcore_core::{
    fields, DropReason, Event, FieldKind, FieldMap, FieldSpec, FieldValue, Level, Schema,
    SchemaRegistry, REDACTED,
};
pub use auditcore_transport::{Transport, TransportHealth, TransportStats};

/// Install a global tracing subscriber for the pipeline's own
/// diagnostics. Entirely optional; embedders with their own subscriber
/// should skip this.
pub fn init_tracing(config: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => {
            registry.with(fmt::layer().json()).init();
        }
        LogFormat::Text => {
            registry.with(fmt::layer()).init();
        }
    }
}
