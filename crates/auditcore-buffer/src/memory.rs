// Heap pressure monitoring
//
// A periodic sampler task (owned by the orchestrator) calls
// `MemoryMonitor::sample_once`; everyone else reads the atomic level
// snapshot. The sampling source is a trait so tests and unsupported
// platforms can substitute a fixed reading.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

/// Discretized heap utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Ok,
    Warning,
    Critical,
}

impl PressureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureLevel::Ok => "ok",
            PressureLevel::Warning => "warning",
            PressureLevel::Critical => "critical",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => PressureLevel::Critical,
            1 => PressureLevel::Warning,
            _ => PressureLevel::Ok,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PressureLevel::Ok => 0,
            PressureLevel::Warning => 1,
            PressureLevel::Critical => 2,
        }
    }
}

/// One heap reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl MemorySample {
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64
    }
}

/// Where heap readings come from.
pub trait MemorySource: Send + Sync {
    /// `None` means the platform cannot report; the monitor holds its
    /// last level.
    fn sample(&self) -> Option<MemorySample>;
}

/// Reads `/proc/meminfo`. On platforms without procfs every sample is
/// `None` and the monitor stays at `Ok`.
#[derive(Debug, Default)]
pub struct ProcMemorySource;

impl MemorySource for ProcMemorySource {
    fn sample(&self) -> Option<MemorySample> {
        let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
        let total = read_meminfo_kb(&contents, "MemTotal:")?;
        let available = read_meminfo_kb(&contents, "MemAvailable:")?;
        Some(MemorySample {
            used_bytes: total.saturating_sub(available) * 1024,
            total_bytes: total * 1024,
        })
    }
}

fn read_meminfo_kb(contents: &str, key: &str) -> Option<u64> {
    let line = contents.lines().find(|l| l.starts_with(key))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Fixed-ratio source for tests and simulated pressure.
#[derive(Debug)]
pub struct FixedMemorySource {
    ratio: Mutex<f64>,
}

impl FixedMemorySource {
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio: Mutex::new(ratio),
        }
    }

    pub fn set_ratio(&self, ratio: f64) {
        *self.ratio.lock() = ratio;
    }
}

impl MemorySource for FixedMemorySource {
    fn sample(&self) -> Option<MemorySample> {
        let ratio = *self.ratio.lock();
        Some(MemorySample {
            used_bytes: (ratio * 1_000_000.0) as u64,
            total_bytes: 1_000_000,
        })
    }
}

/// Pressure thresholds and sampling cadence.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub sample_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 0.70,
            critical_threshold: 0.85,
            sample_interval: Duration::from_millis(5000),
        }
    }
}

/// Snapshot cell written by the sampler, read by admission and dispatch.
pub struct MemoryMonitor {
    config: MemoryConfig,
    source: Box<dyn MemorySource>,
    level: AtomicU8,
    /// Cumulative samples observed at each elevated level.
    warning_count: AtomicU64,
    critical_count: AtomicU64,
}

impl MemoryMonitor {
    pub fn new(config: MemoryConfig, source: Box<dyn MemorySource>) -> Self {
        Self {
            config,
            source,
            level: AtomicU8::new(PressureLevel::Ok.as_u8()),
            warning_count: AtomicU64::new(0),
            critical_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> MemoryConfig {
        self.config
    }

    /// Take one reading and update the snapshot. Called by the sampler
    /// task every `sample_interval`.
    pub fn sample_once(&self) -> PressureLevel {
        let Some(sample) = self.source.sample() else {
            return self.level();
        };
        let ratio = sample.ratio();
        let level = if ratio >= self.config.critical_threshold {
            PressureLevel::Critical
        } else if ratio >= self.config.warning_threshold {
            PressureLevel::Warning
        } else {
            PressureLevel::Ok
        };

        match level {
            PressureLevel::Critical => {
                self.critical_count.fetch_add(1, Ordering::Relaxed);
                debug!(ratio, "memory pressure critical");
            }
            PressureLevel::Warning => {
                self.warning_count.fetch_add(1, Ordering::Relaxed);
            }
            PressureLevel::Ok => {}
        }

        self.level.store(level.as_u8(), Ordering::Release);
        level
    }

    /// Last observed level; never blocks.
    pub fn level(&self) -> PressureLevel {
        PressureLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Admission-side delay for the current level: 0, 100ms or 500ms.
    pub fn backpressure_delay(&self) -> Duration {
        match self.level() {
            PressureLevel::Ok => Duration::ZERO,
            PressureLevel::Warning => Duration::from_millis(100),
            PressureLevel::Critical => Duration::from_millis(500),
        }
    }

    pub fn warning_count(&self) -> u64 {
        self.warning_count.load(Ordering::Relaxed)
    }

    pub fn critical_count(&self) -> u64 {
        self.critical_count.load(Ordering::Relaxed)
    }
}
