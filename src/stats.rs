// Pipeline counters
//
// All counters are cumulative since init; gauge-like readings (buffer
// size, circuit state, memory level) are snapshots taken at the stats()
// call. Writers touch atomics only, so the hot path never blocks on a
// stats reader.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use auditcore_transport::TransportStats;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub logged: AtomicU64,
    pub dropped: AtomicU64,
    pub dropped_on_shutdown: AtomicU64,
    pub sanitized: AtomicU64,
    pub rate_limited: AtomicU64,
    pub validation_errors: AtomicU64,
    pub sent: AtomicU64,
    pub failed: AtomicU64,
    pub fallback_queued: AtomicU64,
    pub fallback_drained: AtomicU64,
    pub delivery_fatal: AtomicBool,
}

impl Counters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }
}

/// Point-in-time view of the whole pipeline, returned by
/// [`crate::Pipeline::stats`].
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Events accepted into the buffer.
    pub logged: u64,
    /// Events rejected at admission (buffer full, cancelled waits,
    /// missing identifiers) plus fallback evictions.
    pub dropped: u64,
    /// Events still undelivered when shutdown completed.
    pub dropped_on_shutdown: u64,
    /// Total redactions performed by the sanitizer.
    pub sanitized: u64,
    /// Admissions that had to defer at the rate limiter.
    pub rate_limited: u64,
    /// Field-level validation errors observed (events still emitted).
    pub validation_errors: u64,
    /// Events delivered through some transport.
    pub sent: u64,
    /// Events whose first dispatch failed on every transport.
    pub failed: u64,
    /// Events diverted into the fallback queue.
    pub fallback_queued: u64,
    /// Events later re-delivered out of the fallback queue.
    pub fallback_drained: u64,
    /// Set once a batch was lost because every transport failed and the
    /// fallback queue overflowed.
    pub delivery_fatal: bool,

    pub buffer: BufferStats,
    pub memory: MemoryStats,
    pub fallback: FallbackStats,
    /// Times a batch was delivered by a transport later in the chain
    /// than the first.
    pub fallovers: u64,
    pub transports: Vec<TransportStats>,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferStats {
    pub size: usize,
    pub capacity: usize,
    pub approx_bytes: usize,
    pub high_watermark_hits: u64,
}

#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub level: &'static str,
    pub warning_count: u64,
    pub critical_count: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackStats {
    pub size: usize,
    pub evicted: u64,
}

impl PipelineStats {
    /// Conservation check: every accepted event is delivered, queued for
    /// fallback, still buffered, or accounted as dropped on shutdown.
    pub fn accounted_for(&self) -> u64 {
        self.sent + self.fallback.size as u64 + self.buffer.size as u64 + self.dropped_on_shutdown
    }
}
