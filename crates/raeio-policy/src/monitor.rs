// monitor.rs — On-demand resource sampling.
//
// A monitor answers two questions: how much system memory is in use (MiB)
// and how busy the CPUs are (percent). Each call is a fresh query with no
// shared counters, so concurrent callers never coordinate.
//
// `SystemMonitor` reads procfs on Linux. Elsewhere it reports
// `MonitorError::Unavailable`, which the policy engine treats as
// "limits not enforceable" rather than as a task failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// One sample of resource usage. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsageSnapshot {
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

/// Source of resource usage samples.
pub trait ResourceMonitor: Send + Sync {
    /// System memory in use, in MiB.
    fn memory_mb(&self) -> Result<f64, MonitorError>;

    /// System-wide CPU utilization, in percent. May block for the
    /// monitor's sampling interval.
    fn cpu_percent(&self) -> Result<f64, MonitorError>;

    fn snapshot(&self) -> Result<ResourceUsageSnapshot, MonitorError> {
        Ok(ResourceUsageSnapshot {
            memory_mb: self.memory_mb()?,
            cpu_percent: self.cpu_percent()?,
        })
    }
}

/// Samples the host via procfs.
#[derive(Debug, Clone)]
pub struct SystemMonitor {
    interval: Duration,
}

/// Short enough to keep per-task checks snappy.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

impl SystemMonitor {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_SAMPLE_INTERVAL)
    }

    /// Use a custom gap between the two CPU samples.
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl ResourceMonitor for SystemMonitor {
    fn memory_mb(&self) -> Result<f64, MonitorError> {
        let meminfo = read_proc("/proc/meminfo")?;
        procfs::memory_used_mb(&meminfo)
    }

    fn cpu_percent(&self) -> Result<f64, MonitorError> {
        let before = procfs::cpu_times(&read_proc("/proc/stat")?)?;
        std::thread::sleep(self.interval);
        let after = procfs::cpu_times(&read_proc("/proc/stat")?)?;
        Ok(procfs::busy_percent(before, after))
    }
}

#[cfg(not(target_os = "linux"))]
impl ResourceMonitor for SystemMonitor {
    fn memory_mb(&self) -> Result<f64, MonitorError> {
        Err(MonitorError::Unavailable(
            "memory sampling requires procfs".to_string(),
        ))
    }

    fn cpu_percent(&self) -> Result<f64, MonitorError> {
        Err(MonitorError::Unavailable(
            "CPU sampling requires procfs".to_string(),
        ))
    }
}

#[cfg(target_os = "linux")]
fn read_proc(path: &str) -> Result<String, MonitorError> {
    std::fs::read_to_string(path)
        .map_err(|e| MonitorError::Unavailable(format!("cannot read {}: {}", path, e)))
}

/// Parsers for the procfs text formats. Platform-independent so they can
/// be tested anywhere.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
mod procfs {
    use crate::error::MonitorError;

    const KIB_PER_MIB: u64 = 1024;

    /// Used memory = MemTotal - MemAvailable, in whole MiB.
    pub(super) fn memory_used_mb(meminfo: &str) -> Result<f64, MonitorError> {
        let field = |name: &str| -> Result<u64, MonitorError> {
            meminfo
                .lines()
                .find_map(|line| {
                    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
                    rest.split_whitespace().next()?.parse::<u64>().ok()
                })
                .ok_or_else(|| MonitorError::Sample {
                    resource: "memory",
                    reason: format!("{} missing from /proc/meminfo", name),
                })
        };

        let total_kib = field("MemTotal")?;
        let available_kib = field("MemAvailable")?;
        let used_mib = total_kib.saturating_sub(available_kib) / KIB_PER_MIB;
        Ok(used_mib as f64)
    }

    /// Aggregate CPU jiffies from the first line of /proc/stat.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct CpuTimes {
        pub idle: u64,
        pub total: u64,
    }

    pub(super) fn cpu_times(stat: &str) -> Result<CpuTimes, MonitorError> {
        let bad = |reason: &str| MonitorError::Sample {
            resource: "cpu",
            reason: reason.to_string(),
        };

        let line = stat
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(|| bad("aggregate cpu line missing from /proc/stat"))?;
        let values = line
            .split_whitespace()
            .skip(1)
            .map(|v| v.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| bad(&format!("unparseable cpu counter: {}", e)))?;
        if values.len() < 4 {
            return Err(bad("too few cpu counters in /proc/stat"));
        }

        // user nice system idle iowait irq softirq steal [guest guest_nice]
        // guest time is already folded into user/nice.
        let counted = &values[..values.len().min(8)];
        let idle = values[3] + values.get(4).copied().unwrap_or(0);
        Ok(CpuTimes {
            idle,
            total: counted.iter().sum(),
        })
    }

    pub(super) fn busy_percent(before: CpuTimes, after: CpuTimes) -> f64 {
        let total = after.total.saturating_sub(before.total);
        if total == 0 {
            return 0.0;
        }
        let idle = after.idle.saturating_sub(before.idle).min(total);
        (total - idle) as f64 * 100.0 / total as f64
    }
}

/// A monitor that always reports the same usage. Used to simulate load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticMonitor {
    snapshot: ResourceUsageSnapshot,
}

impl StaticMonitor {
    pub fn new(memory_mb: f64, cpu_percent: f64) -> Self {
        Self {
            snapshot: ResourceUsageSnapshot {
                memory_mb,
                cpu_percent,
            },
        }
    }
}

impl ResourceMonitor for StaticMonitor {
    fn memory_mb(&self) -> Result<f64, MonitorError> {
        Ok(self.snapshot.memory_mb)
    }

    fn cpu_percent(&self) -> Result<f64, MonitorError> {
        Ok(self.snapshot.cpu_percent)
    }
}
