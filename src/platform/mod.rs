// Platform-specific code module: external tools and OS inventories

pub mod process;
pub mod sysfs;
pub mod xpu_smi;

// Re-exports for cleaner imports
pub use process::{invoke_with_timeout, InvokeError};
pub use sysfs::SYSFS_ROOT;

/// Whether the PCM power daemon can exist on this platform
pub fn supports_power_daemon() -> bool {
    cfg!(target_os = "linux")
}
