// Pipeline orchestration
//
// Owns every component and the two background tasks (dispatcher and
// memory sampler). The `log` path is: admit -> sanitize -> compose ->
// validate -> backpressure -> enqueue. Delivery happens independently on
// the dispatcher task; the caller never waits on transport I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use auditcore_buffer::{
    BatchPolicy, BufferConfig, EventBuffer, FlushPolicy, MemoryConfig, MemoryMonitor,
    MemorySource, ProcMemorySource,
};
use auditcore_config::{validate_config, ConsoleStreamConfig, RuntimeConfig, TransportConfig};
use auditcore_core::{
    sanitize_fields, DropReason, Event, FieldMap, Level, SanitizerConfig, SchemaRegistry,
    SensitiveKeys,
};
use auditcore_limit::{Admission, RateLimiter, RateLimiterConfig};
use auditcore_transport::{
    BreakerConfig, ConsoleStream, ConsoleTransport, FileTransport, FileTransportConfig,
    HttpTransport, HttpTransportConfig, Transport, TransportChain,
};

use crate::dispatch;
use crate::stats::{BufferStats, Counters, FallbackStats, MemoryStats, PipelineStats};
use crate::trace::{current_trace_context, TraceContext};

/// Everything a single `log` call can carry.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: FieldMap,
    pub tenant_key: Option<String>,
    pub schema_name: Option<String>,
    /// Explicit trace context; when absent the task-local one applies.
    pub trace: Option<TraceContext>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            fields: FieldMap::new(),
            tenant_key: None,
            schema_name: None,
            trace: None,
        }
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_key = Some(tenant.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }
}

/// What happened to one `log` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Accepted {
        redactions: usize,
        validation_errors: usize,
    },
    Dropped {
        reason: DropReason,
    },
}

impl LogOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, LogOutcome::Accepted { .. })
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            LogOutcome::Accepted { .. } => None,
            LogOutcome::Dropped { reason } => Some(*reason),
        }
    }
}

const DEFAULT_TENANT_KEY: &str = "default";

pub(crate) struct PipelineInner {
    pub limiter: RateLimiter,
    pub sanitizer: SanitizerConfig,
    pub max_message_len: usize,
    pub schemas: SchemaRegistry,
    pub buffer: EventBuffer,
    pub monitor: MemoryMonitor,
    pub chain: TransportChain,
    pub flush_policy: FlushPolicy,
    pub batch_policy: BatchPolicy,
    pub counters: Counters,
    pub cancel: CancellationToken,
    pub intake_open: AtomicBool,
    pub flush_in_progress: AtomicBool,
    pub epoch: Instant,
}

/// Assembles a [`Pipeline`] from configuration, with seams for schemas,
/// a memory source and replacement transports.
pub struct PipelineBuilder {
    config: RuntimeConfig,
    schemas: SchemaRegistry,
    memory_source: Option<Box<dyn MemorySource>>,
    transports: Option<Vec<Box<dyn Transport>>>,
}

impl PipelineBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            schemas: SchemaRegistry::new(),
            memory_source: None,
            transports: None,
        }
    }

    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn with_memory_source(mut self, source: Box<dyn MemorySource>) -> Self {
        self.memory_source = Some(source);
        self
    }

    /// Replace the configured delivery chain, preserving order.
    pub fn with_transports(mut self, transports: Vec<Box<dyn Transport>>) -> Self {
        self.transports = Some(transports);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        validate_config(&self.config).context("invalid pipeline configuration")?;
        let config = self.config;

        let transports = match self.transports {
            Some(transports) if !transports.is_empty() => transports,
            Some(_) => anyhow::bail!("at least one transport must be provided"),
            None => build_transports(&config.transports)?,
        };

        let limiter = RateLimiter::new(RateLimiterConfig {
            capacity: config.rate_limit.capacity,
            refill_per_sec: config.rate_limit.refill_per_sec,
        });

        let mut keys = SensitiveKeys::with_extra(&config.sanitizer.sensitive_keys);
        if config.sanitizer.mask_contact_info {
            keys = keys.with_contact_masking();
        }
        let sanitizer = SanitizerConfig {
            max_depth: config.sanitizer.max_depth,
            keys,
            encoded_scan: config.sanitizer.encoded_scan,
        };

        let buffer = EventBuffer::new(BufferConfig {
            capacity: config.buffer.capacity,
            high_watermark: config.buffer.high_watermark,
            low_watermark: config.buffer.low_watermark,
            max_bytes: config.buffer.max_bytes,
        });

        let monitor = MemoryMonitor::new(
            MemoryConfig {
                warning_threshold: config.memory.warning_threshold,
                critical_threshold: config.memory.critical_threshold,
                sample_interval: config.memory.sample_interval(),
            },
            self.memory_source
                .unwrap_or_else(|| Box::new(ProcMemorySource)),
        );

        let chain = TransportChain::new(
            transports,
            BreakerConfig {
                failure_threshold: config.breaker.failure_threshold,
                success_threshold: config.breaker.success_threshold,
                reset_timeout: config.breaker.reset_timeout(),
            },
            config.fallback.max_queue_size,
        );

        let schemas = crate::schemas::registry_from_config(&config.schemas, self.schemas)
            .context("invalid schema configuration")?;

        let inner = Arc::new(PipelineInner {
            limiter,
            sanitizer,
            max_message_len: config.sanitizer.max_message_len,
            schemas,
            buffer,
            monitor,
            chain,
            flush_policy: FlushPolicy {
                min_interval: config.flush.min_interval(),
                max_interval: config.flush.max_interval(),
            },
            batch_policy: BatchPolicy {
                base_size: config.batch.base_size,
                min_size: config.batch.min_size,
                max_size: config.batch.max_size,
            },
            counters: Counters::default(),
            cancel: CancellationToken::new(),
            intake_open: AtomicBool::new(true),
            flush_in_progress: AtomicBool::new(false),
            epoch: Instant::now(),
        });

        let (pause_tx, pause_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatch::run_dispatcher(inner.clone(), pause_rx));
        let sampler = spawn_memory_sampler(inner.clone());

        info!(
            transports = inner.chain.transport_count(),
            buffer_capacity = config.buffer.capacity,
            "audit pipeline started"
        );

        Ok(Pipeline {
            inner,
            pause_tx,
            tasks: Mutex::new(vec![dispatcher, sampler]),
            shutdown_started: AtomicBool::new(false),
        })
    }
}

fn build_transports(configs: &[TransportConfig]) -> Result<Vec<Box<dyn Transport>>> {
    let mut transports: Vec<Box<dyn Transport>> = Vec::with_capacity(configs.len());
    for config in configs {
        match config {
            TransportConfig::Http {
                endpoint,
                timeout_ms,
                retries,
                headers,
            } => {
                let transport = HttpTransport::new(HttpTransportConfig {
                    endpoint: endpoint.clone(),
                    timeout: Duration::from_millis(*timeout_ms),
                    retries: *retries,
                    headers: headers.clone(),
                    backoff_base: Duration::from_millis(100),
                })
                .with_context(|| format!("failed to build http transport for {}", endpoint))?;
                transports.push(Box::new(transport));
            }
            TransportConfig::File { path, max_bytes } => {
                transports.push(Box::new(FileTransport::new(FileTransportConfig {
                    path: path.into(),
                    max_bytes: *max_bytes,
                })));
            }
            TransportConfig::Console { stream } => {
                let stream = match stream {
                    ConsoleStreamConfig::Stdout => ConsoleStream::Stdout,
                    ConsoleStreamConfig::Stderr => ConsoleStream::Stderr,
                    ConsoleStreamConfig::Split => ConsoleStream::SplitByLevel,
                };
                transports.push(Box::new(ConsoleTransport::new(stream)));
            }
        }
    }
    Ok(transports)
}

fn spawn_memory_sampler(inner: Arc<PipelineInner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(inner.monitor.config().sample_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    inner.monitor.sample_once();
                }
                _ = inner.cancel.cancelled() => return,
            }
        }
    })
}

/// The assembled audit pipeline.
pub struct Pipeline {
    inner: Arc<PipelineInner>,
    pause_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_started: AtomicBool,
}

impl Pipeline {
    /// Build from configuration with default schemas and transports.
    pub fn init(config: RuntimeConfig) -> Result<Self> {
        PipelineBuilder::new(config).build()
    }

    pub fn builder(config: RuntimeConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Ingest one event.
    pub async fn log(
        &self,
        level: Level,
        message: impl Into<String>,
        fields: FieldMap,
    ) -> LogOutcome {
        self.log_with(LogRecord::new(level, message).with_fields(fields))
            .await
    }

    /// Ingest one event with full control over tenant, schema and trace
    /// context.
    pub async fn log_with(&self, record: LogRecord) -> LogOutcome {
        let inner = &self.inner;

        if !inner.intake_open.load(Ordering::Acquire) {
            return LogOutcome::Dropped {
                reason: DropReason::ShuttingDown,
            };
        }

        if record.message.is_empty() {
            Counters::incr(&inner.counters.dropped);
            return LogOutcome::Dropped {
                reason: DropReason::MissingIdentifiers,
            };
        }

        // 1. Rate limit, keyed by tenant.
        let key = record.tenant_key.as_deref().unwrap_or(DEFAULT_TENANT_KEY);
        if let Admission::Deferred { .. } = inner.limiter.admit(key, 1.0) {
            Counters::incr(&inner.counters.rate_limited);
            if inner
                .limiter
                .wait_and_admit(key, 1.0, &inner.cancel)
                .await
                .is_err()
            {
                Counters::incr(&inner.counters.dropped);
                return LogOutcome::Dropped {
                    reason: DropReason::RateLimited,
                };
            }
        }

        // 2. Sanitize before the value reaches any queue or sink.
        let (fields, report) = sanitize_fields(record.fields, &inner.sanitizer);
        if report.count() > 0 {
            Counters::add(&inner.counters.sanitized, report.count() as u64);
        }

        // 3. Compose the event with tracing enrichment.
        let trace = record.trace.or_else(current_trace_context);
        let mut event = Event::new(record.level, record.message, fields);
        event.ingest_ms = inner.epoch.elapsed().as_millis() as u64;
        event.tenant_key = record.tenant_key;
        event.schema_name = record.schema_name;
        if let Some(trace) = trace {
            event.trace_id = Some(trace.trace_id);
            event.span_id = Some(trace.span_id);
            event.parent_span_id = trace.parent_span_id;
        }
        event.bound_message(inner.max_message_len);

        // 4. Validate; errors are diagnostics, not admission failures.
        let schema = inner.schemas.resolve(event.schema_name.as_deref());
        let outcome = auditcore_core::validate(&event.fields, &schema);
        let validation_errors = outcome.errors.len();
        if validation_errors > 0 {
            Counters::add(&inner.counters.validation_errors, validation_errors as u64);
            warn!(
                schema = schema.name(),
                errors = validation_errors,
                first = %outcome.errors[0],
                "event failed schema validation"
            );
        }
        event.fields = outcome.normalized;

        // 5. Backpressure, then enqueue.
        let delay = inner.monitor.backpressure_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if inner.buffer.push(event) {
            Counters::incr(&inner.counters.logged);
            LogOutcome::Accepted {
                redactions: report.count(),
                validation_errors,
            }
        } else {
            Counters::incr(&inner.counters.dropped);
            LogOutcome::Dropped {
                reason: DropReason::BufferFull,
            }
        }
    }

    /// Stop the dispatcher draining (delivery maintenance window).
    /// Admission keeps running against the bounded buffer.
    pub fn pause(&self) {
        self.pause_tx.send_replace(true);
    }

    /// Resume draining after [`Pipeline::pause`].
    pub fn resume(&self) {
        self.pause_tx.send_replace(false);
    }

    /// Await buffer drain, bounded by `grace`. Returns false when the
    /// deadline expired with events still queued or in flight.
    pub async fn flush(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let idle = self.inner.buffer.is_empty()
                && !self.inner.flush_in_progress.load(Ordering::Acquire);
            if idle {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            self.inner.buffer.flush_wake().notify_one();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Idempotent: stop intake, drain within `grace`, terminate tasks.
    /// Whatever remains undelivered is counted as dropped on shutdown.
    pub async fn shutdown(&self, grace: Duration) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.intake_open.store(false, Ordering::Release);
        self.resume();

        let drained = self.flush(grace).await;
        if !drained {
            warn!("shutdown grace period expired with events still queued");
        }

        self.inner.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("task list lock");
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }

        let leftover_buffer = self.inner.buffer.drain(usize::MAX).len();
        let leftover_fallback = self.inner.chain.fallback().drain_up_to(usize::MAX).len();
        let leftover = (leftover_buffer + leftover_fallback) as u64;
        if leftover > 0 {
            Counters::add(&self.inner.counters.dropped_on_shutdown, leftover);
            warn!(events = leftover, "events dropped on shutdown");
        }

        self.inner.chain.drain_transports().await;
        info!("audit pipeline stopped");
    }

    /// Counters and snapshots; see [`PipelineStats`].
    pub fn stats(&self) -> PipelineStats {
        let inner = &self.inner;
        let counters = &inner.counters;
        PipelineStats {
            logged: counters.logged.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            dropped_on_shutdown: counters.dropped_on_shutdown.load(Ordering::Relaxed),
            sanitized: counters.sanitized.load(Ordering::Relaxed),
            rate_limited: counters.rate_limited.load(Ordering::Relaxed),
            validation_errors: counters.validation_errors.load(Ordering::Relaxed),
            sent: counters.sent.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            fallback_queued: counters.fallback_queued.load(Ordering::Relaxed),
            fallback_drained: counters.fallback_drained.load(Ordering::Relaxed),
            delivery_fatal: counters.delivery_fatal.load(Ordering::Relaxed),
            buffer: BufferStats {
                size: inner.buffer.len(),
                capacity: inner.buffer.capacity(),
                approx_bytes: inner.buffer.approx_bytes(),
                high_watermark_hits: inner.buffer.high_watermark_hits(),
            },
            memory: MemoryStats {
                level: inner.monitor.level().as_str(),
                warning_count: inner.monitor.warning_count(),
                critical_count: inner.monitor.critical_count(),
            },
            fallback: FallbackStats {
                size: inner.chain.fallback().len(),
                evicted: inner.chain.fallback().evicted_total(),
            },
            fallovers: inner.chain.fallover_count(),
            transports: inner.chain.transport_stats(),
        }
    }
}
