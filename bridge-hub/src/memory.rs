//! RSS-based memory-pressure sampling.
//!
//! RSS, not heap, is canonical here because it is portable across runtimes
//! with different heap-accounting semantics.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sysinfo::{Pid, System};

/// The three load levels the hub reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    /// Below the warning threshold; no shedding.
    Normal,
    /// At or above the warning threshold: frames larger than 1 KiB are
    /// shed.
    Warning,
    /// At or above the critical threshold: new connections are refused and
    /// readiness reports false.
    Critical,
}

/// Samples this process's resident-set size on demand and classifies it
/// against configured thresholds.
pub struct MemorySampler {
    system: Mutex<System>,
    pid: Pid,
    warning_mb: u64,
    critical_mb: u64,
    last_rss_mb: AtomicU64,
}

impl MemorySampler {
    /// Creates a sampler for the current process.
    pub fn new(warning_mb: u64, critical_mb: u64) -> Self {
        let pid = sysinfo::get_current_pid().unwrap_or(Pid::from(0));
        Self {
            system: Mutex::new(System::new()),
            pid,
            warning_mb,
            critical_mb,
            last_rss_mb: AtomicU64::new(0),
        }
    }

    /// Refreshes this process's memory stats and returns the current RSS in
    /// megabytes.
    pub fn sample_rss_mb(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        let rss_mb = system
            .process(self.pid)
            .map(|process| process.memory() / (1024 * 1024))
            .unwrap_or(0);
        self.last_rss_mb.store(rss_mb, Ordering::Relaxed);
        metrics::gauge!(crate::metrics::METRICS_ID_MEMORY_RSS_MB).set(rss_mb as f64);
        rss_mb
    }

    /// The RSS last observed by [`MemorySampler::sample_rss_mb`], without
    /// re-sampling.
    pub fn last_rss_mb(&self) -> u64 {
        self.last_rss_mb.load(Ordering::Relaxed)
    }

    /// Classifies `rss_mb` against the configured thresholds.
    pub fn pressure_for(&self, rss_mb: u64) -> MemoryPressure {
        if rss_mb >= self.critical_mb {
            MemoryPressure::Critical
        } else if rss_mb >= self.warning_mb {
            MemoryPressure::Warning
        } else {
            MemoryPressure::Normal
        }
    }

    /// Samples and classifies in one call.
    pub fn current_pressure(&self) -> MemoryPressure {
        self.pressure_for(self.sample_rss_mb())
    }
}
