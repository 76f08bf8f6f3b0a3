use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::time::Instant;

use super::{MetricSource, SourceScope};
use crate::core::devices::DeviceDescriptor;
use crate::core::telemetry::{MetricSample, SourceKind};
use crate::platform::sysfs;
use crate::platform::SYSFS_ROOT;

/// NPU utilisation from the driver's cumulative busy-time counter.
///
/// Utilisation is the busy-time delta over the wall-clock delta between two
/// samples. No accelerator node means no NPU: a terminal null, not an error.
pub struct NpuSource {
    sysfs_root: PathBuf,
    previous: Mutex<Option<(u64, Instant)>>,
}

impl NpuSource {
    pub fn new() -> Self {
        Self::with_sysfs_root(PathBuf::from(SYSFS_ROOT))
    }

    pub fn with_sysfs_root(root: PathBuf) -> Self {
        Self {
            sysfs_root: root,
            previous: Mutex::new(None),
        }
    }
}

impl Default for NpuSource {
    fn default() -> Self {
        Self::new()
    }
}

fn utilization(busy_delta_us: u64, wall_delta_us: u128) -> f64 {
    if wall_delta_us == 0 {
        return 0.0;
    }
    (busy_delta_us as f64 / wall_delta_us as f64 * 100.0).clamp(0.0, 100.0)
}

#[async_trait]
impl MetricSource for NpuSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Npu
    }

    fn scope(&self) -> SourceScope {
        SourceScope::Machine
    }

    async fn sample(&self, _device: Option<&DeviceDescriptor>) -> MetricSample {
        let Some(accel) = sysfs::list_accel_devices(&self.sysfs_root).into_iter().next() else {
            return MetricSample::unsupported(SourceKind::Npu, None);
        };
        let Some(busy_us) = accel.read_busy_time_us() else {
            // Accelerator present but the driver does not expose the counter
            return MetricSample::unsupported(SourceKind::Npu, None);
        };

        let now = Instant::now();
        let previous = self.previous.lock().replace((busy_us, now));
        let value = match previous {
            Some((prev_busy, prev_at)) if busy_us >= prev_busy => utilization(
                busy_us - prev_busy,
                now.duration_since(prev_at).as_micros(),
            ),
            // First reading, or the counter reset with the driver
            _ => 0.0,
        };

        MetricSample::reading(SourceKind::Npu, None, value)
    }
}
