// Process registry backed by the local OS.
// The table of launched workers is persisted so `stop` and `resume` work
// across separate invocations of the binary.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System};

use super::LaunchSpec;
use crate::core::validation::SafeToken;
use crate::error::{EdgeError, Result};

/// Time a worker gets to exit after SIGTERM before it is killed
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Registered worker: its launch spec plus the last known process identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub spec: LaunchSpec,
    /// PID of the running instance, `None` after a clean stop
    pub pid: Option<u32>,
    /// Process start time (seconds since epoch) to detect PID reuse
    pub started_at: Option<u64>,
    pub launched_at: chrono::DateTime<chrono::Utc>,
}

/// Named process management: launch, relaunch, terminate and liveness by id.
#[async_trait]
pub trait ProcessRegistry: Send + Sync {
    async fn is_running(&self, id: &SafeToken) -> Result<bool>;

    async fn entry(&self, id: &SafeToken) -> Result<Option<ProcessEntry>>;

    /// Register `spec` under `id` (replacing any previous spec) and start it.
    async fn launch(&self, id: &SafeToken, spec: LaunchSpec) -> Result<u32>;

    /// Start the previously registered spec again.
    async fn relaunch(&self, id: &SafeToken) -> Result<u32>;

    /// Stop the running instance. Returns false when nothing was running.
    async fn terminate(&self, id: &SafeToken) -> Result<bool>;

    /// Drop the registration entirely. Unknown ids are a no-op.
    async fn forget(&self, id: &SafeToken) -> Result<()>;
}

/// Registry that spawns detached OS processes and keeps its table on disk.
///
/// Worker stdout and stderr are appended to `<logs_dir>/<id>.log`.
pub struct LocalProcessRegistry {
    table_path: PathBuf,
    logs_dir: PathBuf,
    table: Mutex<BTreeMap<String, ProcessEntry>>,
    system: Mutex<System>,
    stop_grace: Duration,
}

impl LocalProcessRegistry {
    pub fn open(table_path: &Path, logs_dir: &Path) -> Result<Self> {
        let table = if table_path.exists() {
            let content = fs::read_to_string(table_path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    EdgeError::registry(format!(
                        "corrupt process table {}: {}",
                        table_path.display(),
                        e
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            table_path: table_path.to_path_buf(),
            logs_dir: logs_dir.to_path_buf(),
            table: Mutex::new(table),
            system: Mutex::new(System::new()),
            stop_grace: DEFAULT_STOP_GRACE,
        })
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn log_path(&self, id: &SafeToken) -> PathBuf {
        self.logs_dir.join(format!("{}.log", id))
    }

    fn persist(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&*self.table.lock())?;
        if let Some(parent) = self.table_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.table_path, content)?;
        Ok(())
    }

    fn refresh_pid(&self, system: &mut System, pid: Pid) {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
    }

    /// A pid counts as ours only while it is alive and its start time still
    /// matches the one recorded at launch.
    fn is_alive(&self, pid: u32, started_at: Option<u64>) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        self.refresh_pid(&mut system, pid);

        match system.process(pid) {
            Some(process) => {
                if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
                    return false;
                }
                match started_at {
                    Some(expected) => process.start_time() == expected,
                    None => true,
                }
            }
            None => false,
        }
    }

    fn start_time_of(&self, pid: u32) -> Option<u64> {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        self.refresh_pid(&mut system, pid);
        system.process(pid).map(|p| p.start_time())
    }

    fn signal(&self, pid: u32, force: bool) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        self.refresh_pid(&mut system, pid);

        let Some(process) = system.process(pid) else {
            return false;
        };
        if force {
            return process.kill();
        }
        // Platforms without SIGTERM fall back to a hard kill
        process.kill_with(Signal::Term).unwrap_or_else(|| process.kill())
    }

    fn spawn(&self, id: &SafeToken, spec: &LaunchSpec) -> Result<(u32, Option<u64>)> {
        fs::create_dir_all(&self.logs_dir)?;
        let log_path = self.log_path(id);
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        writeln!(
            log,
            "=== {} launching {} {} ===",
            chrono::Utc::now().to_rfc3339(),
            spec.script_name,
            spec.args
                .iter()
                .map(SafeToken::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        )?;
        let stderr = log.try_clone()?;

        let mut command = std::process::Command::new(&spec.program);
        command
            .arg(&spec.script)
            .args(spec.args.iter().map(SafeToken::as_str))
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr));

        // Own process group so the worker outlives a Ctrl+C on the CLI
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = tokio::process::Command::from(command)
            .spawn()
            .map_err(|e| {
                EdgeError::launch(format!(
                    "failed to start {} for workload {}: {}",
                    spec.program.display(),
                    id,
                    e
                ))
            })?;
        let pid = child
            .id()
            .ok_or_else(|| EdgeError::launch(format!("worker for {} exited immediately", id)))?;

        log::info!(
            "Launched {} for workload {} (pid {}, log {})",
            spec.script_name,
            id,
            pid,
            log_path.display()
        );
        Ok((pid, self.start_time_of(pid)))
    }

    fn record(&self, id: &SafeToken, spec: LaunchSpec, pid: u32, started_at: Option<u64>) -> Result<()> {
        self.table.lock().insert(
            id.to_string(),
            ProcessEntry {
                spec,
                pid: Some(pid),
                started_at,
                launched_at: chrono::Utc::now(),
            },
        );
        self.persist()
    }

    async fn wait_for_exit(&self, pid: u32, started_at: Option<u64>, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if !self.is_alive(pid, started_at) {
                return true;
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
        !self.is_alive(pid, started_at)
    }
}

#[async_trait]
impl ProcessRegistry for LocalProcessRegistry {
    async fn is_running(&self, id: &SafeToken) -> Result<bool> {
        let entry = self.table.lock().get(id.as_str()).cloned();
        Ok(match entry {
            Some(ProcessEntry {
                pid: Some(pid),
                started_at,
                ..
            }) => self.is_alive(pid, started_at),
            _ => false,
        })
    }

    async fn entry(&self, id: &SafeToken) -> Result<Option<ProcessEntry>> {
        Ok(self.table.lock().get(id.as_str()).cloned())
    }

    async fn launch(&self, id: &SafeToken, spec: LaunchSpec) -> Result<u32> {
        let (pid, started_at) = self.spawn(id, &spec)?;
        self.record(id, spec, pid, started_at)?;
        Ok(pid)
    }

    async fn relaunch(&self, id: &SafeToken) -> Result<u32> {
        let spec = self
            .table
            .lock()
            .get(id.as_str())
            .map(|entry| entry.spec.clone())
            .ok_or_else(|| EdgeError::not_registered(id.as_str()))?;

        let (pid, started_at) = self.spawn(id, &spec)?;
        self.record(id, spec, pid, started_at)?;
        Ok(pid)
    }

    async fn terminate(&self, id: &SafeToken) -> Result<bool> {
        let entry = self.table.lock().get(id.as_str()).cloned();
        let Some(ProcessEntry {
            pid: Some(pid),
            started_at,
            ..
        }) = entry
        else {
            return Ok(false);
        };

        let mut stopped = false;
        if self.is_alive(pid, started_at) {
            log::info!("Stopping workload {} (pid {})", id, pid);
            self.signal(pid, false);
            if !self.wait_for_exit(pid, started_at, self.stop_grace).await {
                log::warn!(
                    "Workload {} ignored SIGTERM for {:?}, killing pid {}",
                    id,
                    self.stop_grace,
                    pid
                );
                self.signal(pid, true);
                if !self.wait_for_exit(pid, started_at, self.stop_grace).await {
                    return Err(EdgeError::registry(format!(
                        "pid {} for workload {} survived a kill",
                        pid, id
                    )));
                }
            }
            stopped = true;
        }

        if let Some(entry) = self.table.lock().get_mut(id.as_str()) {
            entry.pid = None;
            entry.started_at = None;
        }
        self.persist()?;
        Ok(stopped)
    }

    async fn forget(&self, id: &SafeToken) -> Result<()> {
        if self.table.lock().remove(id.as_str()).is_some() {
            self.persist()?;
        }
        Ok(())
    }
}
