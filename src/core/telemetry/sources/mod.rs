//! Metric source adapters.
//!
//! Each adapter wraps one telemetry provider behind `MetricSource::sample`,
//! which never fails: every outcome, including timeouts and rejected input,
//! is encoded in the returned `MetricSample`.

mod cpu_memory;
mod gpu;
mod npu;
mod power;

pub use cpu_memory::{CpuSource, MemorySource};
pub use gpu::{GpuComputeSource, GpuMemorySource};
pub use npu::NpuSource;
pub use power::{PowerReading, PowerSource};

use async_trait::async_trait;
use std::sync::Arc;

use super::{MetricSample, SourceKind};
use crate::core::config::Config;
use crate::core::devices::{DeviceDescriptor, DeviceKind};

/// What a source is sampled against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceScope {
    /// One request per tick for the whole machine
    Machine,
    /// One request per known device of this kind, fanned out concurrently
    PerDevice(DeviceKind),
}

#[async_trait]
pub trait MetricSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn scope(&self) -> SourceScope;

    /// Take one sample. `device` is `None` for machine-wide sources.
    async fn sample(&self, device: Option<&DeviceDescriptor>) -> MetricSample;
}

/// The standard adapter set, configured from `config`
pub fn default_sources(config: &Config) -> Vec<Arc<dyn MetricSource>> {
    vec![
        Arc::new(CpuSource::new()),
        Arc::new(MemorySource::new()),
        Arc::new(GpuComputeSource::new(&config.gpu_tool)),
        Arc::new(GpuMemorySource::new(&config.gpu_tool)),
        Arc::new(NpuSource::new()),
        Arc::new(PowerSource::new(config.power_port)),
    ]
}
