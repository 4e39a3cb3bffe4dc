//! Metrics collection during a run.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Collects metrics while a module is loaded and run.
#[derive(Default)]
pub struct MetricsCollector {
    /// Timing metrics.
    timing: RwLock<TimingMetrics>,
    /// Fuel metrics.
    fuel: RwLock<FuelMetrics>,
    /// Memory metrics.
    memory: RwLock<MemoryMetrics>,
    /// Syscall metrics.
    syscalls: RwLock<SyscallMetrics>,
    /// Captured output sizes.
    streams: RwLock<StreamMetrics>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of execution.
    pub fn record_start(&self) {
        self.timing.write().start_time = Some(Instant::now());
    }

    /// Record the end of execution.
    pub fn record_end(&self) {
        let mut timing = self.timing.write();
        timing.end_time = Some(Instant::now());
        if let (Some(start), Some(end)) = (timing.start_time, timing.end_time) {
            timing.execution_time = end.duration_since(start);
        }
    }

    /// Record compilation time.
    pub fn record_compilation_time(&self, duration: Duration) {
        self.timing.write().compilation_time = duration;
    }

    /// Record instantiation time.
    pub fn record_instantiation_time(&self, duration: Duration) {
        self.timing.write().instantiation_time = duration;
    }

    /// Record fuel consumption.
    pub fn record_fuel_consumed(&self, initial: u64, remaining: u64) {
        let mut fuel = self.fuel.write();
        fuel.initial_fuel = initial;
        fuel.remaining_fuel = remaining;
        fuel.consumed_fuel = initial.saturating_sub(remaining);
    }

    /// Record the size of linear memory when the run ended.
    pub fn record_final_memory(&self, bytes: usize) {
        self.memory.write().final_memory = bytes;
    }

    /// Record one syscall and whether it returned a non-zero errno.
    pub fn record_syscall(&self, name: &str, failed: bool) {
        let mut syscalls = self.syscalls.write();
        let counter = syscalls.per_function.entry(name.to_string()).or_default();
        counter.calls += 1;
        if failed {
            counter.errors += 1;
        }
    }

    /// Record how much output the guest produced.
    pub fn record_streams(&self, stdout_bytes: u64, stderr_bytes: u64) {
        *self.streams.write() = StreamMetrics {
            stdout_bytes,
            stderr_bytes,
        };
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timing: self.timing.read().clone(),
            fuel: self.fuel.read().clone(),
            memory: self.memory.read().clone(),
            syscalls: self.syscalls.read().clone(),
            streams: self.streams.read().clone(),
        }
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("timing", &*self.timing.read())
            .field("fuel", &*self.fuel.read())
            .field("syscalls", &self.syscalls.read().total_calls())
            .finish()
    }
}

/// Snapshot of collected metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Timing metrics.
    pub timing: TimingMetrics,
    /// Fuel metrics.
    pub fuel: FuelMetrics,
    /// Memory metrics.
    pub memory: MemoryMetrics,
    /// Syscall metrics.
    pub syscalls: SyscallMetrics,
    /// Captured output sizes.
    pub streams: StreamMetrics,
}

/// Timing-related metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingMetrics {
    /// When execution started.
    #[serde(skip)]
    pub start_time: Option<Instant>,
    /// When execution ended.
    #[serde(skip)]
    pub end_time: Option<Instant>,
    /// Time spent in `_start`.
    #[serde(with = "duration_serde")]
    pub execution_time: Duration,
    /// Time spent compiling the module.
    #[serde(with = "duration_serde")]
    pub compilation_time: Duration,
    /// Time spent resolving imports and instantiating.
    #[serde(with = "duration_serde")]
    pub instantiation_time: Duration,
}

/// Fuel-related metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuelMetrics {
    /// Initial fuel allocation.
    pub initial_fuel: u64,
    /// Fuel consumed.
    pub consumed_fuel: u64,
    /// Remaining fuel.
    pub remaining_fuel: u64,
}

/// Memory-related metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Linear memory size in bytes when the run ended.
    pub final_memory: usize,
}

/// Call and error counts for one syscall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyscallCounter {
    /// Number of calls.
    pub calls: u64,
    /// Calls that returned a non-zero errno.
    pub errors: u64,
}

/// Syscall metrics, keyed by function name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyscallMetrics {
    /// Per-function counters.
    pub per_function: BTreeMap<String, SyscallCounter>,
}

impl SyscallMetrics {
    /// Total number of syscalls.
    pub fn total_calls(&self) -> u64 {
        self.per_function.values().map(|c| c.calls).sum()
    }

    /// Total number of syscalls that returned an errno.
    pub fn total_errors(&self) -> u64 {
        self.per_function.values().map(|c| c.errors).sum()
    }
}

/// Captured output sizes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// Bytes written to standard output.
    pub stdout_bytes: u64,
    /// Bytes written to standard error.
    pub stderr_bytes: u64,
}

/// Custom serde for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_nanos().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u128::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_timing() {
        let collector = MetricsCollector::new();

        collector.record_start();
        std::thread::sleep(Duration::from_millis(10));
        collector.record_end();

        let snapshot = collector.snapshot();
        assert!(snapshot.timing.execution_time >= Duration::from_millis(10));
    }

    #[test]
    fn test_metrics_collector_fuel() {
        let collector = MetricsCollector::new();

        collector.record_fuel_consumed(1000, 750);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.fuel.initial_fuel, 1000);
        assert_eq!(snapshot.fuel.consumed_fuel, 250);
        assert_eq!(snapshot.fuel.remaining_fuel, 750);
    }

    #[test]
    fn test_metrics_collector_syscalls() {
        let collector = MetricsCollector::new();

        collector.record_syscall("fd_write", false);
        collector.record_syscall("fd_write", false);
        collector.record_syscall("fd_seek", true);

        let snapshot = collector.snapshot();
        assert_eq!(
            snapshot.syscalls.per_function["fd_write"],
            SyscallCounter { calls: 2, errors: 0 }
        );
        assert_eq!(snapshot.syscalls.total_calls(), 3);
        assert_eq!(snapshot.syscalls.total_errors(), 1);
    }

    #[test]
    fn test_snapshot_serializes_durations_as_nanos() {
        let collector = MetricsCollector::new();
        collector.record_compilation_time(Duration::from_micros(3));

        let json = serde_json::to_value(collector.snapshot()).unwrap();
        assert_eq!(json["timing"]["compilation_time"], 3000);
        assert!(json["timing"].get("start_time").is_none());
    }
}
