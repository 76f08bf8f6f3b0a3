//! CPU and memory adapters backed by OS counters.
//!
//! Both read synchronously through a shared `sysinfo::System`; the lock is
//! never held across an await point.

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use super::{MetricSource, SourceScope};
use crate::core::devices::DeviceDescriptor;
use crate::core::telemetry::{MetricSample, SourceKind};

/// Global CPU utilisation in percent.
///
/// sysinfo computes usage as a delta between two refreshes, so the very first
/// sample after construction reads from the baseline taken in `new`.
pub struct CpuSource {
    system: Mutex<System>,
}

impl CpuSource {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage()),
        );
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for CpuSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Cpu
    }

    fn scope(&self) -> SourceScope {
        SourceScope::Machine
    }

    async fn sample(&self, _device: Option<&DeviceDescriptor>) -> MetricSample {
        let usage = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.global_cpu_usage() as f64
        };
        MetricSample::reading(SourceKind::Cpu, None, usage)
    }
}

/// Used RAM as a percentage of total
pub struct MemorySource {
    system: Mutex<System>,
}

impl MemorySource {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

/// `used / total` in percent; a zero total yields NaN, reported as unsupported
pub(crate) fn memory_percent(used: u64, total: u64) -> f64 {
    used as f64 / total as f64 * 100.0
}

#[async_trait]
impl MetricSource for MemorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Memory
    }

    fn scope(&self) -> SourceScope {
        SourceScope::Machine
    }

    async fn sample(&self, _device: Option<&DeviceDescriptor>) -> MetricSample {
        let (used, total) = {
            let mut system = self.system.lock();
            system.refresh_memory();
            (system.used_memory(), system.total_memory())
        };
        MetricSample::reading(SourceKind::Memory, None, memory_percent(used, total))
    }
}
