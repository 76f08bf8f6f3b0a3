//! Generic hardware inventory read from sysfs.
//!
//! Used when vendor tools are unavailable. Every reader takes the sysfs root
//! as a parameter so tests can point it at a fixture tree.

use std::fs;
use std::path::{Path, PathBuf};

pub const SYSFS_ROOT: &str = "/sys";

/// PCI display controller found in the bus inventory
#[derive(Debug, Clone, PartialEq)]
pub struct PciDisplayDevice {
    pub address: String,
    pub vendor_id: u16,
    pub device_id: u16,
}

impl PciDisplayDevice {
    pub fn vendor_name(&self) -> &'static str {
        match self.vendor_id {
            0x8086 => "Intel",
            0x10de => "NVIDIA",
            0x1002 => "AMD",
            _ => "Unknown",
        }
    }
}

/// An accelerator node exposed under the accel class (Intel NPU via `intel_vpu`)
#[derive(Debug, Clone, PartialEq)]
pub struct AccelDevice {
    pub node: String,
    pub device_dir: PathBuf,
}

impl AccelDevice {
    pub fn busy_time_path(&self) -> PathBuf {
        self.device_dir.join("npu_busy_time_us")
    }

    pub fn read_busy_time_us(&self) -> Option<u64> {
        read_trimmed(&self.busy_time_path())?.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoNode {
    pub index: u32,
    pub name: String,
}

/// Display-class (0x03xxxx) devices on the PCI bus, sorted by address
pub fn list_display_devices(root: &Path) -> Vec<PciDisplayDevice> {
    let dir = root.join("bus/pci/devices");
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut devices: Vec<PciDisplayDevice> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let class = parse_hex(&read_trimmed(&path.join("class"))?)?;
            if (class >> 16) != 0x03 {
                return None;
            }
            Some(PciDisplayDevice {
                address: entry.file_name().to_string_lossy().to_string(),
                vendor_id: parse_hex(&read_trimmed(&path.join("vendor"))?)? as u16,
                device_id: parse_hex(&read_trimmed(&path.join("device"))?)? as u16,
            })
        })
        .collect();

    devices.sort_by(|a, b| a.address.cmp(&b.address));
    devices
}

/// Accelerator nodes (`accel0`, ...) sorted by name
pub fn list_accel_devices(root: &Path) -> Vec<AccelDevice> {
    let dir = root.join("class/accel");
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut devices: Vec<AccelDevice> = entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("accel"))
        .map(|entry| AccelDevice {
            node: entry.file_name().to_string_lossy().to_string(),
            device_dir: entry.path().join("device"),
        })
        .collect();

    devices.sort_by(|a, b| a.node.cmp(&b.node));
    devices
}

/// Video capture nodes with their human-readable names, sorted by index
pub fn list_video_nodes(root: &Path) -> Vec<VideoNode> {
    let dir = root.join("class/video4linux");
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut nodes: Vec<VideoNode> = entries
        .flatten()
        .filter_map(|entry| {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let index = file_name.strip_prefix("video")?.parse().ok()?;
            let name = read_trimmed(&entry.path().join("name"))
                .unwrap_or_else(|| file_name.clone());
            Some(VideoNode { index, name })
        })
        .collect();

    nodes.sort_by_key(|n| n.index);
    nodes
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn parse_hex(raw: &str) -> Option<u32> {
    u32::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}
