// Configuration validation
//
// Rejects values the pipeline cannot run with; warns on values it can run
// with but probably should not.

use anyhow::{bail, Result};
use tracing::warn;

use crate::{RuntimeConfig, TransportConfig};

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_rate_limit(config)?;
    validate_buffer(config)?;
    validate_flush(config)?;
    validate_batch(config)?;
    validate_memory(config)?;
    validate_breaker(config)?;
    validate_transports(config)?;
    validate_sanitizer(config)?;
    validate_fallback(config)?;
    validate_schemas(config)?;
    Ok(())
}

const FIELD_KINDS: &[&str] = &[
    "string",
    "number",
    "boolean",
    "timestamp",
    "mapping",
    "sequence",
    "any",
];

fn validate_schemas(config: &RuntimeConfig) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for schema in &config.schemas {
        if schema.name.is_empty() {
            bail!("schemas: name must not be empty");
        }
        if !seen.insert(schema.name.as_str()) {
            bail!("schemas: duplicate schema name '{}'", schema.name);
        }
        for field in &schema.fields {
            if field.name.is_empty() {
                bail!("schemas.{}: field name must not be empty", schema.name);
            }
            if !FIELD_KINDS.contains(&field.kind.as_str()) {
                bail!(
                    "schemas.{}.{}: unknown kind '{}'",
                    schema.name,
                    field.name,
                    field.kind
                );
            }
            if let (Some(min), Some(max)) = (field.min, field.max) {
                if min > max {
                    bail!("schemas.{}.{}: min exceeds max", schema.name, field.name);
                }
            }
            if let (Some(min), Some(max)) = (field.min_length, field.max_length) {
                if min > max {
                    bail!(
                        "schemas.{}.{}: min_length exceeds max_length",
                        schema.name,
                        field.name
                    );
                }
            }
        }
    }
    Ok(())
}

fn validate_rate_limit(config: &RuntimeConfig) -> Result<()> {
    let rl = &config.rate_limit;
    if rl.capacity <= 0.0 || !rl.capacity.is_finite() {
        bail!("rate_limit.capacity must be a positive number");
    }
    if rl.refill_per_sec <= 0.0 || !rl.refill_per_sec.is_finite() {
        bail!("rate_limit.refill_per_sec must be a positive number");
    }
    Ok(())
}

fn validate_buffer(config: &RuntimeConfig) -> Result<()> {
    let buffer = &config.buffer;
    if buffer.capacity == 0 {
        bail!("buffer.capacity must be greater than 0");
    }
    if !(0.0..=1.0).contains(&buffer.high_watermark) || buffer.high_watermark == 0.0 {
        bail!("buffer.high_watermark must be in (0, 1]");
    }
    if !(0.0..1.0).contains(&buffer.low_watermark) {
        bail!("buffer.low_watermark must be in [0, 1)");
    }
    if buffer.low_watermark >= buffer.high_watermark {
        bail!("buffer.low_watermark must be below buffer.high_watermark");
    }
    if buffer.capacity > 10_000_000 {
        warn!(
            capacity = buffer.capacity,
            "buffer.capacity is very large; may cause memory issues"
        );
    }
    Ok(())
}

fn validate_flush(config: &RuntimeConfig) -> Result<()> {
    let flush = &config.flush;
    if flush.min_interval_ms == 0 {
        bail!("flush.min_interval_ms must be greater than 0");
    }
    if flush.max_interval_ms < flush.min_interval_ms {
        bail!("flush.max_interval_ms must be at least flush.min_interval_ms");
    }
    Ok(())
}

fn validate_batch(config: &RuntimeConfig) -> Result<()> {
    let batch = &config.batch;
    if batch.min_size == 0 {
        bail!("batch.min_size must be greater than 0");
    }
    if batch.base_size < batch.min_size {
        bail!("batch.base_size must be at least batch.min_size");
    }
    if batch.max_size < batch.base_size {
        bail!("batch.max_size must be at least batch.base_size");
    }
    Ok(())
}

fn validate_memory(config: &RuntimeConfig) -> Result<()> {
    let memory = &config.memory;
    if !(0.0..1.0).contains(&memory.warning_threshold) || memory.warning_threshold == 0.0 {
        bail!("memory.warning_threshold must be in (0, 1)");
    }
    if !(0.0..=1.0).contains(&memory.critical_threshold) || memory.critical_threshold == 0.0 {
        bail!("memory.critical_threshold must be in (0, 1]");
    }
    if memory.warning_threshold >= memory.critical_threshold {
        bail!("memory.warning_threshold must be below memory.critical_threshold");
    }
    if memory.sample_interval_ms == 0 {
        bail!("memory.sample_interval_ms must be greater than 0");
    }
    Ok(())
}

fn validate_breaker(config: &RuntimeConfig) -> Result<()> {
    let breaker = &config.breaker;
    if breaker.failure_threshold == 0 {
        bail!("breaker.failure_threshold must be greater than 0");
    }
    if breaker.success_threshold == 0 {
        bail!("breaker.success_threshold must be greater than 0");
    }
    if breaker.reset_timeout_ms == 0 {
        bail!("breaker.reset_timeout_ms must be greater than 0");
    }
    Ok(())
}

fn validate_transports(config: &RuntimeConfig) -> Result<()> {
    if config.transports.is_empty() {
        bail!("at least one transport must be configured");
    }
    for (i, transport) in config.transports.iter().enumerate() {
        match transport {
            TransportConfig::Http {
                endpoint,
                timeout_ms,
                retries,
                ..
            } => {
                if endpoint.is_empty() {
                    bail!("transports[{}]: http endpoint must not be empty", i);
                }
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    bail!(
                        "transports[{}]: http endpoint must start with http:// or https://",
                        i
                    );
                }
                if *timeout_ms == 0 {
                    bail!("transports[{}]: http timeout_ms must be greater than 0", i);
                }
                if *retries == 0 {
                    bail!("transports[{}]: http retries must be greater than 0", i);
                }
            }
            TransportConfig::File { path, .. } => {
                if path.is_empty() {
                    bail!("transports[{}]: file path must not be empty", i);
                }
            }
            TransportConfig::Console { .. } => {}
        }
    }
    Ok(())
}

fn validate_sanitizer(config: &RuntimeConfig) -> Result<()> {
    let sanitizer = &config.sanitizer;
    if sanitizer.max_depth == 0 {
        bail!("sanitizer.max_depth must be greater than 0");
    }
    if sanitizer.max_message_len == 0 {
        bail!("sanitizer.max_message_len must be greater than 0");
    }
    Ok(())
}

fn validate_fallback(config: &RuntimeConfig) -> Result<()> {
    if config.fallback.max_queue_size == 0 {
        bail!("fallback.max_queue_size must be greater than 0");
    }
    Ok(())
}
