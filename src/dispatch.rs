// Dispatcher task
//
// The single flusher: sleeps for the adaptive interval (or until a
// watermark wake), drains pressure-aware batches, and hands them to the
// transport chain. Also retries the fallback queue on a slower cadence.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use auditcore_core::Batch;
use auditcore_transport::DispatchOutcome;
use tokio::sync::watch;
use tracing::debug;

use crate::pipeline::PipelineInner;
use crate::stats::Counters;

/// Fallback re-submission runs every N drain cycles.
const FALLBACK_RETRY_EVERY: u32 = 5;

pub(crate) async fn run_dispatcher(inner: Arc<PipelineInner>, mut paused: watch::Receiver<bool>) {
    let mut cycles: u32 = 0;
    loop {
        // Sit out a pause entirely; wakes are re-armed on resume.
        while *paused.borrow() {
            tokio::select! {
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = inner.cancel.cancelled() => return,
            }
        }

        let interval = inner
            .flush_policy
            .interval(inner.buffer.depth_ratio(), inner.monitor.level());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = inner.buffer.flush_wake().notified() => {
                debug!("watermark wake");
            }
            _ = inner.cancel.cancelled() => return,
        }

        if *paused.borrow() {
            continue;
        }

        drain_cycle(&inner).await;

        cycles = cycles.wrapping_add(1);
        if cycles % FALLBACK_RETRY_EVERY == 0 {
            retry_fallback(&inner).await;
        }
    }
}

/// Drain the buffer to empty in pressure-sized batches. The in-progress
/// flag makes concurrent flush requests coalesce onto the running cycle.
pub(crate) async fn drain_cycle(inner: &PipelineInner) {
    if inner.flush_in_progress.swap(true, Ordering::AcqRel) {
        return;
    }

    loop {
        let size = inner
            .batch_policy
            .batch_size(inner.buffer.len(), inner.monitor.level());
        let events = inner.buffer.drain(size);
        if events.is_empty() {
            break;
        }

        match inner.chain.dispatch(Batch::new(events)).await {
            DispatchOutcome::Delivered { events, .. } => {
                Counters::add(&inner.counters.sent, events as u64);
            }
            DispatchOutcome::Diverted { queued, evicted } => {
                Counters::add(&inner.counters.failed, queued as u64);
                Counters::add(&inner.counters.fallback_queued, queued as u64);
                if evicted > 0 {
                    Counters::add(&inner.counters.dropped, evicted as u64);
                    inner.counters.delivery_fatal.store(true, Ordering::Release);
                }
                // Every transport just failed; let the breakers breathe
                // instead of burning the rest of the buffer this cycle.
                break;
            }
        }
    }

    inner.flush_in_progress.store(false, Ordering::Release);
}

async fn retry_fallback(inner: &PipelineInner) {
    if inner.chain.fallback().is_empty() {
        return;
    }
    let report = inner
        .chain
        .drain_fallback(inner.batch_policy.base_size)
        .await;
    if report.redelivered > 0 {
        Counters::add(&inner.counters.fallback_drained, report.redelivered as u64);
        Counters::add(&inner.counters.sent, report.redelivered as u64);
        debug!(
            redelivered = report.redelivered,
            remaining = report.remaining,
            "fallback queue drained"
        );
    }
}
