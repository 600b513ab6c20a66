// Adaptive flush cadence and batch sizing
//
// Pure functions over queue depth and memory level. The dispatcher calls
// these every cycle; nothing here holds state, so the policies are
// trivially testable against the tuning tables.

use std::time::Duration;

use crate::memory::PressureLevel;

/// Flush interval bounds.
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(5000),
        }
    }
}

impl FlushPolicy {
    /// Next sleep before draining, from queue-depth ratio and memory
    /// level. A fuller queue flushes more often; pressure shortens the
    /// interval further (floor 50ms on the critical halving).
    pub fn interval(&self, depth_ratio: f64, memory: PressureLevel) -> Duration {
        let base = if depth_ratio < 0.25 {
            self.max_interval
        } else if depth_ratio < 0.50 {
            (self.min_interval + self.max_interval) / 2
        } else if depth_ratio < 0.75 {
            self.min_interval * 2
        } else if depth_ratio < 0.90 {
            self.min_interval
        } else {
            self.min_interval / 2
        };

        match memory {
            PressureLevel::Ok => base,
            PressureLevel::Warning => base.mul_f64(0.75),
            PressureLevel::Critical => (base / 2).max(Duration::from_millis(50)),
        }
    }
}

/// Batch size bounds.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    pub base_size: usize,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            base_size: 100,
            min_size: 10,
            max_size: 1000,
        }
    }
}

impl BatchPolicy {
    /// Batch size for the next drain. Deep queues triple the batch (up to
    /// the ceiling); memory pressure shrinks whatever depth selected
    /// (never below the floor).
    pub fn batch_size(&self, queue_len: usize, memory: PressureLevel) -> usize {
        let sized = if queue_len > 5 * self.base_size {
            (3 * self.base_size).min(self.max_size)
        } else if queue_len > 2 * self.base_size {
            2 * self.base_size
        } else {
            self.base_size
        };

        match memory {
            PressureLevel::Ok => sized,
            PressureLevel::Warning => self.min_size.max((sized * 3).div_ceil(4)),
            PressureLevel::Critical => self.min_size.max(sized.div_ceil(2)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FlushPolicy {
        FlushPolicy::default()
    }

    #[test]
    fn test_interval_table() {
        let p = policy();
        let ok = PressureLevel::Ok;
        assert_eq!(p.interval(0.10, ok), Duration::from_millis(5000));
        assert_eq!(p.interval(0.30, ok), Duration::from_millis(2550));
        assert_eq!(p.interval(0.60, ok), Duration::from_millis(200));
        assert_eq!(p.interval(0.80, ok), Duration::from_millis(100));
        assert_eq!(p.interval(0.95, ok), Duration::from_millis(50));
    }

    #[test]
    fn test_interval_memory_adjustment() {
        let p = policy();
        assert_eq!(
            p.interval(0.80, PressureLevel::Warning),
            Duration::from_millis(75)
        );
        assert_eq!(
            p.interval(0.80, PressureLevel::Critical),
            Duration::from_millis(50)
        );
        // The critical floor holds even when halving would go lower.
        assert_eq!(
            p.interval(0.95, PressureLevel::Critical),
            Duration::from_millis(50)
        );
        // And the halving applies where the base is large.
        assert_eq!(
            p.interval(0.10, PressureLevel::Critical),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_batch_size_by_depth() {
        let p = BatchPolicy::default();
        let ok = PressureLevel::Ok;
        assert_eq!(p.batch_size(50, ok), 100);
        assert_eq!(p.batch_size(150, ok), 100);
        assert_eq!(p.batch_size(201, ok), 200);
        assert_eq!(p.batch_size(501, ok), 300);
    }

    #[test]
    fn test_batch_size_ceiling() {
        let p = BatchPolicy {
            base_size: 400,
            min_size: 10,
            max_size: 1000,
        };
        // 3 * 400 would exceed the ceiling.
        assert_eq!(p.batch_size(2001, PressureLevel::Ok), 1000);
    }

    #[test]
    fn test_batch_size_memory_adjustment() {
        let p = BatchPolicy::default();
        assert_eq!(p.batch_size(50, PressureLevel::Warning), 75);
        assert_eq!(p.batch_size(50, PressureLevel::Critical), 50);
        // Floor holds for small bases.
        let small = BatchPolicy {
            base_size: 12,
            min_size: 10,
            max_size: 100,
        };
        assert_eq!(small.batch_size(0, PressureLevel::Critical), 10);
    }

    #[test]
    fn test_batch_size_never_below_floor() {
        let p = BatchPolicy {
            base_size: 10,
            min_size: 8,
            max_size: 100,
        };
        assert_eq!(p.batch_size(0, PressureLevel::Critical), 8);
        assert_eq!(p.batch_size(0, PressureLevel::Warning), 8);
    }
}
