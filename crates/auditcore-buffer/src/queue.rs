// Bounded FIFO of enriched events
//
// Multiple producers push, one dispatcher drains. Push and drain take a
// single mutex with brief critical sections; size and byte counters are
// atomics so stats reads never contend with the hot path. Policy is
// drop-newest: a push at capacity is rejected, never blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use auditcore_core::Event;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Buffer bounds and watermarks.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub capacity: usize,
    /// Fraction of capacity above which an immediate flush is scheduled.
    pub high_watermark: f64,
    /// Fraction of capacity below which the flusher relaxes its cadence.
    pub low_watermark: f64,
    /// Optional byte ceiling; pushes that would exceed it are rejected.
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

/// Bounded queue of events that have already passed sanitize + validate.
pub struct EventBuffer {
    config: BufferConfig,
    high_threshold: usize,
    queue: Mutex<VecDeque<Event>>,
    len: AtomicUsize,
    bytes: AtomicUsize,
    high_watermark_hits: AtomicU64,
    flush_wake: Notify,
}

impl EventBuffer {
    pub fn new(config: BufferConfig) -> Self {
        let high_threshold =
            ((config.capacity as f64 * config.high_watermark).ceil() as usize).max(1);
        Self {
            config,
            high_threshold,
            queue: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
            high_watermark_hits: AtomicU64::new(0),
            flush_wake: Notify::new(),
        }
    }

    /// Enqueue one event. Returns false when the buffer is full
    /// (drop-newest) or the byte ceiling would be exceeded.
    pub fn push(&self, event: Event) -> bool {
        let event_bytes = event.approx_bytes();
        let crossed_high;
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.config.capacity {
                return false;
            }
            if let Some(max_bytes) = self.config.max_bytes {
                if self.bytes.load(Ordering::Relaxed) + event_bytes > max_bytes {
                    return false;
                }
            }
            queue.push_back(event);
            let new_len = queue.len();
            self.len.store(new_len, Ordering::Release);
            self.bytes.fetch_add(event_bytes, Ordering::Relaxed);
            crossed_high = new_len == self.high_threshold;
            if new_len >= self.high_threshold {
                self.flush_wake.notify_one();
            }
        }
        if crossed_high {
            self.high_watermark_hits.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Remove up to `max` events from the head, preserving order.
    pub fn drain(&self, max: usize) -> Vec<Event> {
        let mut queue = self.queue.lock();
        let take = max.min(queue.len());
        let drained: Vec<Event> = queue.drain(..take).collect();
        self.len.store(queue.len(), Ordering::Release);
        drop(queue);

        let freed: usize = drained.iter().map(Event::approx_bytes).sum();
        // Saturating: approx_bytes is stable per event, but never let a
        // racing stats read observe a wrapped counter.
        let _ = self
            .bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| {
                Some(b.saturating_sub(freed))
            });
        drained
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Queue depth as a fraction of capacity.
    pub fn depth_ratio(&self) -> f64 {
        self.len() as f64 / self.config.capacity as f64
    }

    pub fn approx_bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn high_watermark_hits(&self) -> u64 {
        self.high_watermark_hits.load(Ordering::Relaxed)
    }

    pub fn is_above_high_watermark(&self) -> bool {
        self.len() >= self.high_threshold
    }

    pub fn is_below_low_watermark(&self) -> bool {
        self.depth_ratio() < self.config.low_watermark
    }

    /// Notified when a push crosses the high watermark; the dispatcher
    /// selects on this alongside its adaptive sleep so scheduled flushes
    /// coalesce.
    pub fn flush_wake(&self) -> &Notify {
        &self.flush_wake
    }
}
