//! Output parsing for the Intel GPU management CLI (`xpu-smi`).
//!
//! `stats -d <bdf> -j` prints one JSON object with a `device_level` array of
//! `{metrics_type, avg | value}` entries; `discovery -j` prints a
//! `device_list` of `{device_name, pci_bdf_address}`.

use serde::Deserialize;

pub const COMPUTE_ALL_UTILIZATION: &str = "XPUM_STATS_ENGINE_GROUP_COMPUTE_ALL_UTILIZATION";
pub const RENDER_ALL_UTILIZATION: &str = "XPUM_STATS_ENGINE_GROUP_RENDER_ALL_UTILIZATION";
pub const MEMORY_UTILIZATION: &str = "XPUM_STATS_MEMORY_UTILIZATION";

#[derive(Debug, Deserialize)]
struct StatsOutput {
    #[serde(default)]
    device_level: Vec<StatsEntry>,
}

#[derive(Debug, Deserialize)]
struct StatsEntry {
    metrics_type: String,
    #[serde(default)]
    avg: Option<f64>,
    #[serde(default)]
    value: Option<f64>,
}

/// Parsed `stats` output
#[derive(Debug, Default)]
pub struct GpuStats {
    entries: Vec<(String, f64)>,
}

impl GpuStats {
    /// First metric of `keys` present in the output, in order of preference
    pub fn pick(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|key| {
            self.entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, v)| *v)
        })
    }

    /// Compute-engine utilisation, falling back to the render engines
    pub fn compute_utilization(&self) -> Option<f64> {
        self.pick(&[COMPUTE_ALL_UTILIZATION, RENDER_ALL_UTILIZATION])
    }

    /// `None` on integrated GPUs that have no dedicated memory
    pub fn memory_utilization(&self) -> Option<f64> {
        self.pick(&[MEMORY_UTILIZATION])
    }
}

pub fn parse_stats(raw: &str) -> Result<GpuStats, serde_json::Error> {
    let output: StatsOutput = serde_json::from_str(first_json_object(raw))?;
    let entries = output
        .device_level
        .into_iter()
        .filter_map(|entry| {
            entry
                .avg
                .or(entry.value)
                .map(|v| (entry.metrics_type, v))
        })
        .collect();
    Ok(GpuStats { entries })
}

#[derive(Debug, Deserialize)]
struct DiscoveryOutput {
    #[serde(default)]
    device_list: Vec<DiscoveredGpu>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiscoveredGpu {
    #[serde(default)]
    pub device_name: String,
    pub pci_bdf_address: String,
}

pub fn parse_discovery(raw: &str) -> Result<Vec<DiscoveredGpu>, serde_json::Error> {
    let output: DiscoveryOutput = serde_json::from_str(first_json_object(raw))?;
    Ok(output.device_list)
}

/// The tool sometimes prints warnings before the JSON body; start at the first brace.
fn first_json_object(raw: &str) -> &str {
    match raw.find('{') {
        Some(start) => &raw[start..],
        None => raw,
    }
}
