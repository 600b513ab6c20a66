// Ordered transport chain
//
// One batch, one pass: the first transport whose breaker permits and whose
// send succeeds wins. Failures are recorded against that transport's
// breaker and the chain moves on; a batch nothing accepted is diverted
// whole to the fallback queue.

use std::sync::atomic::{AtomicU64, Ordering};

use auditcore_core::{Batch, Event};
use tracing::{debug, warn};

use crate::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use crate::fallback::FallbackQueue;
use crate::Transport;

struct GuardedTransport {
    transport: Box<dyn Transport>,
    breaker: CircuitBreaker,
}

/// Result of dispatching one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered {
        transport: String,
        events: usize,
        /// True when at least one earlier transport was skipped or failed.
        fell_over: bool,
    },
    Diverted {
        queued: usize,
        evicted: usize,
    },
}

/// Result of a fallback re-submission pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FallbackDrainReport {
    pub redelivered: usize,
    pub remaining: usize,
}

/// Per-transport stats row.
#[derive(Debug, Clone)]
pub struct TransportStats {
    pub name: String,
    pub breaker: BreakerSnapshot,
}

pub struct TransportChain {
    transports: Vec<GuardedTransport>,
    fallback: FallbackQueue,
    fallovers: AtomicU64,
}

impl TransportChain {
    pub fn new(
        transports: Vec<Box<dyn Transport>>,
        breaker_config: BreakerConfig,
        fallback_max: usize,
    ) -> Self {
        let transports = transports
            .into_iter()
            .map(|transport| {
                let breaker = CircuitBreaker::new(transport.name().to_string(), breaker_config);
                GuardedTransport { transport, breaker }
            })
            .collect();
        Self {
            transports,
            fallback: FallbackQueue::new(fallback_max),
            fallovers: AtomicU64::new(0),
        }
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Deliver a batch through the first willing transport, diverting to
    /// the fallback queue when every transport refuses or fails.
    pub async fn dispatch(&self, batch: Batch) -> DispatchOutcome {
        let mut fell_over = false;

        for guarded in &self.transports {
            if let Err(open) = guarded.breaker.permit() {
                debug!(
                    transport = guarded.transport.name(),
                    retry_after_ms = open.retry_after.as_millis() as u64,
                    "transport skipped, circuit open"
                );
                fell_over = true;
                continue;
            }

            match guarded.transport.send(&batch).await {
                Ok(()) => {
                    guarded.breaker.record_success();
                    if fell_over {
                        self.fallovers.fetch_add(1, Ordering::Relaxed);
                    }
                    return DispatchOutcome::Delivered {
                        transport: guarded.transport.name().to_string(),
                        events: batch.len(),
                        fell_over,
                    };
                }
                Err(err) => {
                    guarded.breaker.record_failure();
                    warn!(
                        transport = guarded.transport.name(),
                        batch = %batch.id(),
                        error = %err,
                        kind = err.kind(),
                        "transport send failed"
                    );
                    fell_over = true;
                }
            }
        }

        let events: Vec<Event> = batch.into_events();
        let queued = events.len();
        let evicted = self.fallback.push_events(events);
        DispatchOutcome::Diverted { queued, evicted }
    }

    /// Re-submit queued fallback events through the chain in batches of
    /// `max_batch`. Stops at the first batch that fails again (it is
    /// already back in the queue).
    pub async fn drain_fallback(&self, max_batch: usize) -> FallbackDrainReport {
        let mut redelivered = 0usize;
        loop {
            let events = self.fallback.drain_up_to(max_batch.max(1));
            if events.is_empty() {
                break;
            }
            let count = events.len();
            match self.dispatch(Batch::new(events)).await {
                DispatchOutcome::Delivered { .. } => {
                    redelivered += count;
                }
                DispatchOutcome::Diverted { .. } => break,
            }
        }
        FallbackDrainReport {
            redelivered,
            remaining: self.fallback.len(),
        }
    }

    /// Flush transport-internal buffering (file appenders) at shutdown.
    pub async fn drain_transports(&self) {
        for guarded in &self.transports {
            if let Err(err) = guarded.transport.drain().await {
                warn!(
                    transport = guarded.transport.name(),
                    error = %err,
                    "transport drain failed"
                );
            }
        }
    }

    pub fn fallback(&self) -> &FallbackQueue {
        &self.fallback
    }

    /// Times a batch was delivered by a transport other than the first
    /// willing one.
    pub fn fallover_count(&self) -> u64 {
        self.fallovers.load(Ordering::Relaxed)
    }

    pub fn transport_stats(&self) -> Vec<TransportStats> {
        self.transports
            .iter()
            .map(|guarded| TransportStats {
                name: guarded.transport.name().to_string(),
                breaker: guarded.breaker.snapshot(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use async_trait::async_trait;
    use auditcore_core::{FieldMap, Level, TransportError};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct FlakyTransport {
        name: &'static str,
        fail: bool,
        sent_batches: Arc<AtomicUsize>,
        sent_events: Arc<AtomicUsize>,
    }

    impl FlakyTransport {
        fn new(name: &'static str, fail: bool) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let batches = Arc::new(AtomicUsize::new(0));
            let events = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    fail,
                    sent_batches: batches.clone(),
                    sent_events: events.clone(),
                },
                batches,
                events,
            )
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, batch: &Batch) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Connect("refused".to_string()));
            }
            self.sent_batches.fetch_add(1, Ordering::SeqCst);
            self.sent_events.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn batch(n: usize) -> Batch {
        Batch::new(
            (0..n)
                .map(|i| Event::new(Level::Info, format!("m{}", i), FieldMap::new()))
                .collect(),
        )
    }

    fn chain(transports: Vec<Box<dyn Transport>>) -> TransportChain {
        TransportChain::new(transports, BreakerConfig::default(), 100)
    }

    #[tokio::test]
    async fn test_first_transport_wins() {
        let (t0, b0, _) = FlakyTransport::new("a", false);
        let (t1, b1, _) = FlakyTransport::new("b", false);
        let chain = chain(vec![Box::new(t0), Box::new(t1)]);

        match chain.dispatch(batch(3)).await {
            DispatchOutcome::Delivered {
                transport,
                events,
                fell_over,
            } => {
                assert_eq!(transport, "a");
                assert_eq!(events, 3);
                assert!(!fell_over);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(b0.load(Ordering::SeqCst), 1);
        assert_eq!(b1.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallover_to_second() {
        let (t0, _, _) = FlakyTransport::new("bad", true);
        let (t1, _, e1) = FlakyTransport::new("good", false);
        let chain = chain(vec![Box::new(t0), Box::new(t1)]);

        for _ in 0..10 {
            match chain.dispatch(batch(1)).await {
                DispatchOutcome::Delivered { transport, .. } => assert_eq!(transport, "good"),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }

        assert_eq!(e1.load(Ordering::SeqCst), 10);
        assert!(chain.fallover_count() >= 1);

        let stats = chain.transport_stats();
        // Five consecutive failures opened the first breaker; later
        // batches skip it outright.
        assert_eq!(stats[0].breaker.state, BreakerState::Open);
        assert_eq!(stats[0].breaker.failures, 5);
        assert!(stats[0].breaker.rejections >= 1);
        assert_eq!(stats[1].breaker.successes, 10);
    }

    #[tokio::test]
    async fn test_all_fail_diverts_to_fallback() {
        let (t0, _, _) = FlakyTransport::new("bad", true);
        let chain = chain(vec![Box::new(t0)]);

        match chain.dispatch(batch(4)).await {
            DispatchOutcome::Diverted { queued, evicted } => {
                assert_eq!(queued, 4);
                assert_eq!(evicted, 0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(chain.fallback().len(), 4);
    }

    #[tokio::test]
    async fn test_fallback_overflow_evicts_oldest() {
        let (t0, _, _) = FlakyTransport::new("bad", true);
        let chain = TransportChain::new(vec![Box::new(t0)], BreakerConfig::default(), 3);

        chain.dispatch(batch(3)).await;
        match chain.dispatch(batch(2)).await {
            DispatchOutcome::Diverted { evicted, .. } => assert_eq!(evicted, 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(chain.fallback().len(), 3);
    }

    #[tokio::test]
    async fn test_drain_fallback_redelivers() {
        // Start with a failing-only chain to stock the fallback queue.
        let (bad, _, _) = FlakyTransport::new("bad", true);
        let stocked = chain(vec![Box::new(bad)]);
        stocked.dispatch(batch(5)).await;
        let leftovers = stocked.fallback().drain_up_to(100);

        // Now a healthy chain picks them up.
        let (good, _, events) = FlakyTransport::new("good", false);
        let healthy = chain(vec![Box::new(good)]);
        healthy.fallback().push_events(leftovers);

        let report = healthy.drain_fallback(2).await;
        assert_eq!(report.redelivered, 5);
        assert_eq!(report.remaining, 0);
        assert_eq!(events.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_drain_fallback_stops_on_failure() {
        let (bad, _, _) = FlakyTransport::new("bad", true);
        let chain = chain(vec![Box::new(bad)]);
        chain.dispatch(batch(5)).await;

        let report = chain.drain_fallback(2).await;
        assert_eq!(report.redelivered, 0);
        assert_eq!(report.remaining, 5);
    }
}
