use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::telemetry::{PollPolicy, SourceKind};
use crate::error::{EdgeError, Result};

/// Default port of the PCM sensor server exposing `/persecond`
pub const DEFAULT_POWER_PORT: u16 = 9738;

/// Default GPU management CLI
pub const DEFAULT_GPU_TOOL: &str = "xpu-smi";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root folder holding one sub-folder (with its own `.venv`) per worker script
    #[serde(default = "default_workers_dir")]
    pub workers_dir: PathBuf,
    /// Trusted directory for uploaded media; the only place deletions may happen
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    /// Predefined sample assets shipped with the workers
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    /// Process table, worker logs and the workload store
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_power_port")]
    pub power_port: u16,
    #[serde(default = "default_gpu_tool")]
    pub gpu_tool: String,
    /// Per-source overrides of the polling policy
    #[serde(default)]
    pub telemetry: BTreeMap<SourceKind, PolicyOverride>,
}

/// Partial polling policy; unset fields keep the source's default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyOverride {
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_limit: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers_dir: default_workers_dir(),
            media_dir: default_media_dir(),
            assets_dir: default_assets_dir(),
            state_dir: default_state_dir(),
            power_port: default_power_port(),
            gpu_tool: default_gpu_tool(),
            telemetry: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load from an explicit path. Missing, empty or outdated files yield defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read(path)?;
        if data.is_empty() {
            return Ok(Config::default());
        }

        match serde_json::from_slice(&data) {
            Ok(config) => Ok(config),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable config {}: {} (using defaults)",
                    path.display(),
                    e
                );
                Ok(Config::default())
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| EdgeError::config("Could not determine config directory"))?;

        Ok(config_dir.join("edgeboard").join("config.json"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    pub fn process_table_path(&self) -> PathBuf {
        self.state_dir.join("processes.json")
    }

    pub fn workload_store_path(&self) -> PathBuf {
        self.state_dir.join("workloads.json")
    }

    /// Effective polling policy for `kind`: the source default with any override applied
    pub fn poll_policy(&self, kind: SourceKind) -> PollPolicy {
        let mut policy = PollPolicy::for_source(kind);
        if let Some(over) = self.telemetry.get(&kind) {
            if let Some(ms) = over.interval_ms {
                policy.interval = Duration::from_millis(ms.max(100));
            }
            if let Some(ms) = over.timeout_ms {
                policy.timeout = Some(Duration::from_millis(ms));
            }
            if let Some(limit) = over.retry_limit {
                policy.retry_limit = limit;
            }
            if let Some(ms) = over.retry_delay_ms {
                policy.retry_delay = Duration::from_millis(ms);
            }
        }
        policy
    }
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("edgeboard")
}

fn default_workers_dir() -> PathBuf {
    data_root().join("workers")
}

fn default_media_dir() -> PathBuf {
    data_root().join("media")
}

fn default_assets_dir() -> PathBuf {
    data_root().join("assets")
}

fn default_state_dir() -> PathBuf {
    data_root().join("state")
}

fn default_power_port() -> u16 {
    DEFAULT_POWER_PORT
}

fn default_gpu_tool() -> String {
    DEFAULT_GPU_TOOL.to_string()
}
