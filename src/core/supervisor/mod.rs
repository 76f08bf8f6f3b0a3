//! Worker process supervision.
//!
//! A workload is served by one long-running worker process, addressed by the
//! workload id. The supervisor validates every token that reaches the command
//! line, resolves the worker's isolated environment and serializes operations
//! on the same id so concurrent reconciliations cannot double-launch.

mod environment;
mod memory;
mod registry;

pub use environment::WorkerEnvironment;
pub use memory::{MemoryRegistry, RegistryCall};
pub use registry::{LocalProcessRegistry, ProcessEntry, ProcessRegistry};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::validation::{ContainedPath, SafeToken};
use crate::error::{EdgeError, Result};

/// Fully resolved, validated command for one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub script_name: SafeToken,
    pub program: PathBuf,
    pub script: PathBuf,
    pub working_dir: PathBuf,
    pub args: Vec<SafeToken>,
}

/// Unvalidated launch input: worker folder name plus its argument list.
///
/// Arguments matching one of `contained` exactly are validated as media
/// paths; everything else goes through the argument allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub script: String,
    pub args: Vec<String>,
    pub contained: Vec<ContainedPath>,
}

impl LaunchRequest {
    pub fn new(script: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            script: script.into(),
            args,
            contained: Vec::new(),
        }
    }

    pub fn with_contained_path(mut self, path: ContainedPath) -> Self {
        self.contained.push(path);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A live instance already existed; nothing was started
    AlreadyRunning,
    /// A new process was started from the request
    Launched(u32),
    /// The previously registered process was restarted
    Resumed(u32),
}

impl StartOutcome {
    pub fn pid(&self) -> Option<u32> {
        match self {
            StartOutcome::AlreadyRunning => None,
            StartOutcome::Launched(pid) | StartOutcome::Resumed(pid) => Some(*pid),
        }
    }
}

pub struct Supervisor {
    registry: Arc<dyn ProcessRegistry>,
    environment: WorkerEnvironment,
    locks: Mutex<HashMap<SafeToken, Arc<tokio::sync::Mutex<()>>>>,
}

impl Supervisor {
    pub fn new(registry: Arc<dyn ProcessRegistry>, environment: WorkerEnvironment) -> Self {
        Self {
            registry,
            environment,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn ProcessRegistry> {
        &self.registry
    }

    fn lock_for(&self, id: &SafeToken) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(id.clone()).or_default().clone()
    }

    fn prepare(&self, request: LaunchRequest) -> Result<LaunchSpec> {
        let script = SafeToken::identifier(&request.script)?;
        let args = request
            .args
            .iter()
            .map(|arg| {
                match request
                    .contained
                    .iter()
                    .find(|path| path.as_path().to_str() == Some(arg.as_str()))
                {
                    Some(path) => SafeToken::contained_path(path),
                    None => SafeToken::argument(arg),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        self.environment.resolve(&script, args)
    }

    /// Ensure the worker for `workload_id` is running.
    ///
    /// With a request, a new process is launched from it (replacing any
    /// stopped registration). Without one, the registered process is resumed.
    /// Nothing is started while an instance is alive.
    pub async fn start(
        &self,
        workload_id: &str,
        request: Option<LaunchRequest>,
    ) -> Result<StartOutcome> {
        let id = SafeToken::identifier(workload_id)?;
        let spec = request.map(|r| self.prepare(r)).transpose()?;

        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        if self.registry.is_running(&id).await? {
            log::info!("Workload {} already has a running worker", id);
            return Ok(StartOutcome::AlreadyRunning);
        }

        match spec {
            Some(spec) => {
                let pid = self.registry.launch(&id, spec).await?;
                Ok(StartOutcome::Launched(pid))
            }
            None => {
                if self.registry.entry(&id).await?.is_none() {
                    return Err(EdgeError::not_registered(id.as_str()));
                }
                let pid = self.registry.relaunch(&id).await?;
                log::info!("Resumed workload {} (pid {})", id, pid);
                Ok(StartOutcome::Resumed(pid))
            }
        }
    }

    /// Stop the worker. Returns false (and does nothing) when it was not running.
    pub async fn stop(&self, workload_id: &str) -> Result<bool> {
        let id = SafeToken::identifier(workload_id)?;
        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        if !self.registry.is_running(&id).await? {
            log::debug!("Workload {} is not running, nothing to stop", id);
            return Ok(false);
        }
        self.registry.terminate(&id).await
    }

    /// Stop the worker if needed and drop its registration.
    pub async fn delete(&self, workload_id: &str) -> Result<()> {
        let id = SafeToken::identifier(workload_id)?;
        let lock = self.lock_for(&id);
        {
            let _guard = lock.lock().await;
            if self.registry.is_running(&id).await? {
                self.registry.terminate(&id).await?;
            }
            self.registry.forget(&id).await?;
        }

        // Keep the mutex while anyone else holds or waits on it
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
        Ok(())
    }

    pub async fn is_running(&self, workload_id: &str) -> Result<bool> {
        let id = SafeToken::identifier(workload_id)?;
        self.registry.is_running(&id).await
    }
}
