use std::path::{Path, PathBuf};

use super::LaunchSpec;
use crate::core::validation::SafeToken;
use crate::error::{EdgeError, Result};

/// Entry point every worker folder provides
const WORKER_ENTRY: &str = "main.py";

/// Resolves the isolated interpreter and entry script of a worker folder.
///
/// Layout: `<workers_dir>/<script>/.venv/<bin>/python` next to
/// `<workers_dir>/<script>/main.py`.
#[derive(Debug, Clone)]
pub struct WorkerEnvironment {
    workers_dir: PathBuf,
}

impl WorkerEnvironment {
    pub fn new(workers_dir: impl Into<PathBuf>) -> Self {
        Self {
            workers_dir: workers_dir.into(),
        }
    }

    pub fn workers_dir(&self) -> &Path {
        &self.workers_dir
    }

    pub fn interpreter_path(&self, script: &SafeToken) -> PathBuf {
        let venv = self.workers_dir.join(script.as_str()).join(".venv");
        if cfg!(windows) {
            venv.join("Scripts").join("python.exe")
        } else {
            venv.join("bin").join("python")
        }
    }

    pub fn script_path(&self, script: &SafeToken) -> PathBuf {
        self.workers_dir.join(script.as_str()).join(WORKER_ENTRY)
    }

    /// Build a launch spec, failing if the worker has not been installed
    pub fn resolve(&self, script: &SafeToken, args: Vec<SafeToken>) -> Result<LaunchSpec> {
        let program = self.interpreter_path(script);
        if !program.exists() {
            return Err(EdgeError::launch(format!(
                "interpreter for '{}' not found at {}",
                script,
                program.display()
            )));
        }

        let entry = self.script_path(script);
        if !entry.is_file() {
            return Err(EdgeError::launch(format!(
                "worker script for '{}' not found at {}",
                script,
                entry.display()
            )));
        }

        Ok(LaunchSpec {
            script_name: script.clone(),
            program,
            working_dir: self.workers_dir.join(script.as_str()),
            script: entry,
            args,
        })
    }
}
