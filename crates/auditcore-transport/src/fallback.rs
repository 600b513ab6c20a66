// Bounded local queue for events the chain could not deliver
//
// Eviction is drop-oldest: under sustained outage the freshest events
// survive, the opposite of the main buffer's drop-newest admission.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use auditcore_core::Event;
use parking_lot::Mutex;
use tracing::warn;

pub struct FallbackQueue {
    max_size: usize,
    queue: Mutex<VecDeque<Event>>,
    queued_total: AtomicU64,
    drained_total: AtomicU64,
    evicted_total: AtomicU64,
}

impl FallbackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            queue: Mutex::new(VecDeque::new()),
            queued_total: AtomicU64::new(0),
            drained_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
        }
    }

    /// Append undeliverable events, evicting from the front when full.
    /// Returns the number evicted.
    pub fn push_events(&self, events: Vec<Event>) -> usize {
        let mut queue = self.queue.lock();
        let mut evicted = 0usize;
        for event in events {
            if queue.len() >= self.max_size {
                queue.pop_front();
                evicted += 1;
            }
            queue.push_back(event);
            self.queued_total.fetch_add(1, Ordering::Relaxed);
        }
        drop(queue);

        if evicted > 0 {
            self.evicted_total.fetch_add(evicted as u64, Ordering::Relaxed);
            warn!(evicted, "fallback queue full, oldest events evicted");
        }
        evicted
    }

    /// Take up to `max` events from the front for re-delivery.
    pub fn drain_up_to(&self, max: usize) -> Vec<Event> {
        let mut queue = self.queue.lock();
        let take = max.min(queue.len());
        let drained: Vec<Event> = queue.drain(..take).collect();
        drop(queue);
        self.drained_total
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn queued_total(&self) -> u64 {
        self.queued_total.load(Ordering::Relaxed)
    }

    pub fn drained_total(&self) -> u64 {
        self.drained_total.load(Ordering::Relaxed)
    }

    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }
}
