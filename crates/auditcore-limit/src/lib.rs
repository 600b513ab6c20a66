// auditcore-limit - token-bucket admission on the ingest edge
//
// Buckets are keyed (by tenant or route), created on first use, and
// refilled lazily at admission time. Admission never fails; at worst it
// defers with a computed wait. Distinct keys never contend beyond the map
// lock, whose critical section is a few arithmetic operations.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Bucket parameters shared by every key.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Maximum (and initial) token count per bucket.
    pub capacity: f64,
    /// Continuous refill rate, tokens per second.
    pub refill_per_sec: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 100.0,
            refill_per_sec: 50.0,
        }
    }
}

/// Outcome of a non-blocking admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Allowed,
    Deferred { wait: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    pub fn wait(&self) -> Duration {
        match self {
            Admission::Allowed => Duration::ZERO,
            Admission::Deferred { wait } => *wait,
        }
    }
}

/// The blocking admission was cancelled before tokens became available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("admission wait was cancelled")]
pub struct Cancelled;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(config: &RateLimiterConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity,
            last_refill: now,
        }
    }

    fn admit(&mut self, config: &RateLimiterConfig, cost: f64, now: Instant) -> Admission {
        let rate = config.refill_per_sec.max(1e-9);
        // A cost above capacity would defer forever; clamp so the caller
        // pays the whole bucket instead.
        let cost = cost.min(config.capacity).max(0.0);

        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(config.capacity);
        self.last_refill = now;

        self.tokens -= cost;
        if self.tokens >= 0.0 {
            return Admission::Allowed;
        }

        let deficit = -self.tokens;
        self.tokens += cost;
        let wait_ms = (deficit / rate * 1000.0).ceil() as u64;
        Admission::Deferred {
            wait: Duration::from_millis(wait_ms),
        }
    }
}

/// Keyed token-bucket rate limiter.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// Try to admit `cost` units under `key`. A missing key is created
    /// full.
    pub fn admit(&self, key: &str, cost: f64) -> Admission {
        self.admit_at(key, cost, Instant::now())
    }

    fn admit_at(&self, key: &str, cost: f64, now: Instant) -> Admission {
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(&self.config, now));
        bucket.admit(&self.config, cost, now)
    }

    /// Suspend until `cost` units are available under `key`, or until
    /// `cancel` fires. Deferred waits re-check admission after sleeping,
    /// since concurrent callers may have drained the refill.
    pub async fn wait_and_admit(
        &self,
        key: &str,
        cost: f64,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        loop {
            match self.admit(key, cost) {
                Admission::Allowed => return Ok(()),
                Admission::Deferred { wait } => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(Cancelled),
                    }
                }
            }
        }
    }

    /// Number of live buckets.
    pub fn key_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Drop buckets idle longer than `max_idle`. An evicted key is
    /// recreated full on next use, which can only admit more than keeping
    /// the stale bucket would have. Returns the number removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < max_idle);
        before - buckets.len()
    }
}
