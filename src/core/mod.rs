// Core orchestration and telemetry logic

pub mod config;
pub mod devices;
pub mod reconciler;
pub mod supervisor;
pub mod telemetry;
pub mod validation;
pub mod workload;

// Re-export commonly used items
pub use config::Config;
pub use devices::{DeviceCatalog, DeviceDescriptor, DeviceDiscovery, DeviceKind};
pub use reconciler::{compose_launch_args, Reconciler};
pub use supervisor::{LaunchRequest, StartOutcome, Supervisor};
pub use telemetry::{AggregatedSnapshot, MetricSample, TelemetryRuntime};
pub use workload::{Workload, WorkloadHooks, WorkloadStatus, WorkloadStore};
