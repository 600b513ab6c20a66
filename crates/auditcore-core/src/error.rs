// Error taxonomy shared across the pipeline crates
//
// Transport failures never propagate to the `log` caller; they drive the
// circuit breakers and surface through counters. Admission outcomes do
// reach the caller, as a `DropReason` rather than an error.

use std::time::Duration;

use thiserror::Error;

/// Why an accepted `log` call did not make it into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// `wait_and_admit` was cancelled before tokens became available.
    RateLimited,
    /// The buffer was at capacity (drop-newest policy).
    BufferFull,
    /// Validation found the event missing timestamp, level or message.
    MissingIdentifiers,
    /// The pipeline is shutting down and no longer accepts events.
    ShuttingDown,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::RateLimited => "rate_limited",
            DropReason::BufferFull => "buffer_full",
            DropReason::MissingIdentifiers => "missing_identifiers",
            DropReason::ShuttingDown => "shutting_down",
        }
    }
}

/// Synthetic rejection produced by an open circuit breaker.
#[derive(Debug, Clone, Error)]
#[error("circuit open; retry after {}ms", retry_after.as_millis())]
pub struct CircuitOpen {
    pub retry_after: Duration,
}

/// A single transport attempt failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("endpoint returned HTTP {status}")]
    Http { status: u16 },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),
}

impl TransportError {
    /// Whether the HTTP transport should retry this failure internally.
    /// Client-side errors (4xx) and breaker rejections fail fast.
    pub fn retryable(&self) -> bool {
        match self {
            TransportError::Http { status } => *status >= 500,
            TransportError::Connect(_) | TransportError::Timeout { .. } => true,
            TransportError::Io(_) => true,
            TransportError::Serialize(_) => false,
            TransportError::CircuitOpen(_) => false,
        }
    }

    /// Stable kind string for counters and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Http { .. } => "http",
            TransportError::Connect(_) => "connect",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Io(_) => "io",
            TransportError::Serialize(_) => "serialize",
            TransportError::CircuitOpen(_) => "circuit_open",
        }
    }
}

/// Outcome of a chain dispatch that could not deliver directly.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Every transport failed; the batch sits in the fallback queue.
    #[error("all transports failed; {queued} events queued for fallback")]
    Diverted { queued: usize },

    /// Every transport failed and the fallback queue overflowed.
    #[error("all transports failed and fallback full; {evicted} events evicted")]
    Fatal { evicted: usize },
}
