//! Per-GPU compute and memory utilisation via the vendor CLI.
//!
//! Each sample spawns `<tool> stats -d <bdf> -j` for one bus address. The bus
//! address is re-validated here even though discovery produced it, because it
//! is the only device-supplied string that reaches a command line.

use async_trait::async_trait;
use std::time::Duration;

use super::{MetricSource, SourceScope};
use crate::core::devices::{DeviceDescriptor, DeviceKind};
use crate::core::telemetry::{MetricSample, SourceKind};
use crate::core::validation::BusAddress;
use crate::platform::invoke_with_timeout;
use crate::platform::xpu_smi::{self, GpuStats};

pub(crate) const DEFAULT_GPU_TOOL_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared invocation logic for both GPU adapters
#[derive(Debug, Clone)]
struct GpuStatsQuery {
    tool: String,
    timeout: Duration,
}

impl GpuStatsQuery {
    fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            timeout: DEFAULT_GPU_TOOL_TIMEOUT,
        }
    }

    async fn run(
        &self,
        kind: SourceKind,
        device: Option<&DeviceDescriptor>,
        pick: fn(&GpuStats) -> Option<f64>,
    ) -> MetricSample {
        let Some(device) = device else {
            return MetricSample::rejected(kind, None, "GPU sample requested without a device");
        };
        let device_id = Some(device.id.as_str());

        let raw_address = device
            .bus_address
            .as_ref()
            .map(|b| b.as_str())
            .unwrap_or_default();
        let bus = match BusAddress::parse(raw_address) {
            Ok(bus) => bus,
            Err(e) => return MetricSample::rejected(kind, device_id, e.to_string()),
        };

        let raw = match invoke_with_timeout(
            &self.tool,
            &["stats", "-d", bus.as_str(), "-j"],
            self.timeout,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                log::debug!("{} sample for {} failed: {}", kind, device.id, e);
                return MetricSample::transient(kind, device_id, e.to_string());
            }
        };

        match xpu_smi::parse_stats(&raw) {
            Ok(stats) => match pick(&stats) {
                Some(value) => MetricSample::reading(kind, device_id, value),
                None => MetricSample::unsupported(kind, device_id),
            },
            Err(e) => MetricSample::transient(
                kind,
                device_id,
                format!("malformed {} output: {}", self.tool, e),
            ),
        }
    }
}

/// Compute-engine utilisation (render engines on GPUs without compute groups)
pub struct GpuComputeSource {
    query: GpuStatsQuery,
}

impl GpuComputeSource {
    pub fn new(tool: &str) -> Self {
        Self {
            query: GpuStatsQuery::new(tool),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.query.timeout = timeout;
        self
    }
}

#[async_trait]
impl MetricSource for GpuComputeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GpuCompute
    }

    fn scope(&self) -> SourceScope {
        SourceScope::PerDevice(DeviceKind::Gpu)
    }

    async fn sample(&self, device: Option<&DeviceDescriptor>) -> MetricSample {
        self.query
            .run(SourceKind::GpuCompute, device, GpuStats::compute_utilization)
            .await
    }
}

/// Device memory utilisation; terminal null on integrated GPUs
pub struct GpuMemorySource {
    query: GpuStatsQuery,
}

impl GpuMemorySource {
    pub fn new(tool: &str) -> Self {
        Self {
            query: GpuStatsQuery::new(tool),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.query.timeout = timeout;
        self
    }
}

#[async_trait]
impl MetricSource for GpuMemorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::GpuMemory
    }

    fn scope(&self) -> SourceScope {
        SourceScope::PerDevice(DeviceKind::Gpu)
    }

    async fn sample(&self, device: Option<&DeviceDescriptor>) -> MetricSample {
        self.query
            .run(SourceKind::GpuMemory, device, GpuStats::memory_utilization)
            .await
    }
}
