// auditcore-transport - getting batches out of the process
//
// A transport is anything that can deliver a batch. The chain tries them
// in configured order, each guarded by its own circuit breaker; what
// nothing could deliver lands in the bounded fallback queue for later
// re-submission.

mod breaker;
mod chain;
mod console;
mod fallback;
mod file;
mod http;

pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use chain::{DispatchOutcome, FallbackDrainReport, TransportChain, TransportStats};
pub use console::{ConsoleStream, ConsoleTransport};
pub use fallback::FallbackQueue;
pub use file::{FileTransport, FileTransportConfig};
pub use http::{HttpTransport, HttpTransportConfig};

use async_trait::async_trait;
use auditcore_core::{Batch, TransportError};

/// Coarse transport self-assessment, surfaced through `stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHealth {
    Healthy,
    Degraded,
    Unavailable,
}

/// A delivery destination.
///
/// `send` must be cancel-safe: a batch is either fully handed to the sink
/// or the error is reported so the chain can try elsewhere. Transports are
/// driven serially by the dispatcher; implementations may still guard
/// internal state for the shutdown path.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, batch: &Batch) -> Result<(), TransportError>;

    /// Flush any internal buffering. Default is a no-op.
    async fn drain(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn health(&self) -> TransportHealth {
        TransportHealth::Healthy
    }
}
