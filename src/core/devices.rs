//! Device discovery.
//!
//! Enumerates the CPU, GPUs, the NPU and cameras once per session (or on
//! demand) to seed the telemetry polling set and to check workload device
//! selections. Discovery never fails: missing tools or hardware simply yield
//! fewer descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::validation::BusAddress;
use crate::platform::sysfs::{self, PciDisplayDevice};
use crate::platform::xpu_smi::{self, DiscoveredGpu};
use crate::platform::{invoke_with_timeout, SYSFS_ROOT};

const INTEL_VENDOR_ID: u16 = 0x8086;
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Npu,
    Camera,
}

/// One discovered device, reused as the polling key across samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Inference device id (`CPU`, `GPU.0`, `NPU`) or `camera:<index>`
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub bus_address: Option<BusAddress>,
    pub index: u32,
}

impl DeviceDescriptor {
    pub fn cpu() -> Self {
        Self {
            id: "CPU".to_string(),
            name: cpu_brand().unwrap_or_else(|| "CPU".to_string()),
            kind: DeviceKind::Cpu,
            bus_address: None,
            index: 0,
        }
    }

    pub fn gpu(index: u32, name: &str, bus_address: BusAddress) -> Self {
        Self {
            id: format!("GPU.{}", index),
            name: name.to_string(),
            kind: DeviceKind::Gpu,
            bus_address: Some(bus_address),
            index,
        }
    }

    pub fn npu(name: &str) -> Self {
        Self {
            id: "NPU".to_string(),
            name: name.to_string(),
            kind: DeviceKind::Npu,
            bus_address: None,
            index: 0,
        }
    }

    pub fn camera(index: u32, name: &str) -> Self {
        Self {
            id: format!("camera:{}", index),
            name: name.to_string(),
            kind: DeviceKind::Camera,
            bus_address: None,
            index,
        }
    }

    /// Path of the capture node a streaming worker should open
    pub fn capture_path(&self) -> Option<String> {
        match self.kind {
            DeviceKind::Camera => Some(format!("/dev/video{}", self.index)),
            _ => None,
        }
    }
}

/// The set of devices known to this session
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceCatalog {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceCatalog {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn of_kind(&self, kind: DeviceKind) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter().filter(move |d| d.kind == kind)
    }

    pub fn get(&self, id: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Whether `id` can be handed to an inference worker. `AUTO` is always accepted.
    pub fn is_inference_device(&self, id: &str) -> bool {
        id == "AUTO"
            || self
                .get(id)
                .is_some_and(|d| d.kind != DeviceKind::Camera)
    }

    /// Camera names mapped to their capture index
    pub fn cameras(&self) -> Vec<(String, u32)> {
        self.of_kind(DeviceKind::Camera)
            .map(|d| (d.name.clone(), d.index))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DeviceDiscovery {
    gpu_tool: String,
    sysfs_root: PathBuf,
    timeout: Duration,
}

impl DeviceDiscovery {
    pub fn new(gpu_tool: &str) -> Self {
        Self {
            gpu_tool: gpu_tool.to_string(),
            sysfs_root: PathBuf::from(SYSFS_ROOT),
            timeout: DISCOVERY_TIMEOUT,
        }
    }

    /// Read inventories from `root` instead of `/sys`
    pub fn with_sysfs_root(mut self, root: PathBuf) -> Self {
        self.sysfs_root = root;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full inventory: CPU first, then GPUs, NPU and cameras
    pub async fn discover(&self) -> DeviceCatalog {
        let mut devices = vec![DeviceDescriptor::cpu()];
        devices.extend(self.discover_gpus().await);
        devices.extend(self.discover_npu());
        devices.extend(self.discover_cameras());

        log::info!("Discovered {} devices", devices.len());
        DeviceCatalog::new(devices)
    }

    /// GPUs from the vendor tool, topped up from the PCI inventory
    pub async fn discover_gpus(&self) -> Vec<DeviceDescriptor> {
        let vendor = self.query_vendor_tool().await;
        let inventory: Vec<PciDisplayDevice> = sysfs::list_display_devices(&self.sysfs_root)
            .into_iter()
            .filter(|d| d.vendor_id == INTEL_VENDOR_ID)
            .collect();
        merge_gpu_inventories(&vendor, &inventory)
    }

    async fn query_vendor_tool(&self) -> Vec<DiscoveredGpu> {
        if which::which(&self.gpu_tool).is_err() {
            log::debug!("{} not found, using PCI inventory", self.gpu_tool);
            return Vec::new();
        }

        match invoke_with_timeout(&self.gpu_tool, &["discovery", "-j"], self.timeout).await {
            Ok(raw) => xpu_smi::parse_discovery(&raw).unwrap_or_else(|e| {
                log::warn!("Unreadable {} discovery output: {}", self.gpu_tool, e);
                Vec::new()
            }),
            Err(e) => {
                log::warn!("GPU discovery via {} failed: {}", self.gpu_tool, e);
                Vec::new()
            }
        }
    }

    pub fn discover_npu(&self) -> Option<DeviceDescriptor> {
        sysfs::list_accel_devices(&self.sysfs_root)
            .into_iter()
            .next()
            .map(|accel| DeviceDescriptor::npu(&format!("Intel NPU ({})", accel.node)))
    }

    pub fn discover_cameras(&self) -> Vec<DeviceDescriptor> {
        sysfs::list_video_nodes(&self.sysfs_root)
            .into_iter()
            .map(|node| DeviceDescriptor::camera(node.index, &node.name))
            .collect()
    }
}

/// Combine vendor and inventory results, dropping duplicate bus addresses.
///
/// Vendor entries come first so their marketing names win. Ids are assigned
/// in bus order, matching the runtime's `GPU.<n>` numbering.
pub fn merge_gpu_inventories(
    vendor: &[DiscoveredGpu],
    inventory: &[PciDisplayDevice],
) -> Vec<DeviceDescriptor> {
    let candidates = vendor
        .iter()
        .map(|gpu| (gpu.pci_bdf_address.as_str(), gpu.device_name.clone()))
        .chain(inventory.iter().map(|dev| {
            (
                dev.address.as_str(),
                format!("{} GPU [{:04x}]", dev.vendor_name(), dev.device_id),
            )
        }));

    let mut seen = HashSet::new();
    let mut found: Vec<(BusAddress, String)> = Vec::new();
    for (address, name) in candidates {
        let bus = match BusAddress::parse(address) {
            Ok(bus) => bus,
            Err(_) => continue,
        };
        if seen.insert(bus.short_form().to_string()) {
            found.push((bus, name));
        }
    }

    found.sort_by(|a, b| a.0.short_form().cmp(b.0.short_form()));
    found
        .into_iter()
        .enumerate()
        .map(|(i, (bus, name))| DeviceDescriptor::gpu(i as u32, &name, bus))
        .collect()
}

fn cpu_brand() -> Option<String> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu_list(sysinfo::CpuRefreshKind::nothing());
    system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
}
