use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

use super::{LaunchSpec, ProcessEntry, ProcessRegistry};
use crate::core::validation::SafeToken;
use crate::error::{EdgeError, Result};

/// One call observed by a [`MemoryRegistry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Launch { id: String, args: Vec<String> },
    Relaunch { id: String },
    Terminate { id: String },
    Forget { id: String },
}

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<String, ProcessEntry>,
    running: BTreeSet<String>,
    calls: Vec<RegistryCall>,
    next_pid: u32,
    fail_launches: bool,
}

/// Registry that records what it is asked to do without starting anything.
///
/// Backs `--dry-run` on the CLI.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<MemoryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent launch or relaunch fails with a launch error
    pub fn fail_launches(&self, fail: bool) {
        self.state.lock().fail_launches = fail;
    }

    /// Mark a worker as exited on its own
    pub fn simulate_exit(&self, id: &str) {
        self.state.lock().running.remove(id);
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&RegistryCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn start(state: &mut MemoryState, id: &SafeToken) -> Result<u32> {
        if state.fail_launches {
            return Err(EdgeError::launch(format!("launch refused for {}", id)));
        }
        state.next_pid += 1;
        let pid = 10_000 + state.next_pid;
        state.running.insert(id.to_string());
        if let Some(entry) = state.entries.get_mut(id.as_str()) {
            entry.pid = Some(pid);
        }
        Ok(pid)
    }
}

#[async_trait]
impl ProcessRegistry for MemoryRegistry {
    async fn is_running(&self, id: &SafeToken) -> Result<bool> {
        Ok(self.state.lock().running.contains(id.as_str()))
    }

    async fn entry(&self, id: &SafeToken) -> Result<Option<ProcessEntry>> {
        Ok(self.state.lock().entries.get(id.as_str()).cloned())
    }

    async fn launch(&self, id: &SafeToken, spec: LaunchSpec) -> Result<u32> {
        let mut state = self.state.lock();
        state.calls.push(RegistryCall::Launch {
            id: id.to_string(),
            args: spec.args.iter().map(|a| a.to_string()).collect(),
        });
        state.entries.insert(
            id.to_string(),
            ProcessEntry {
                spec,
                pid: None,
                started_at: None,
                launched_at: chrono::Utc::now(),
            },
        );
        Self::start(&mut state, id)
    }

    async fn relaunch(&self, id: &SafeToken) -> Result<u32> {
        let mut state = self.state.lock();
        state.calls.push(RegistryCall::Relaunch { id: id.to_string() });
        if !state.entries.contains_key(id.as_str()) {
            return Err(EdgeError::not_registered(id.as_str()));
        }
        Self::start(&mut state, id)
    }

    async fn terminate(&self, id: &SafeToken) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.push(RegistryCall::Terminate { id: id.to_string() });
        if let Some(entry) = state.entries.get_mut(id.as_str()) {
            entry.pid = None;
        }
        Ok(state.running.remove(id.as_str()))
    }

    async fn forget(&self, id: &SafeToken) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(RegistryCall::Forget { id: id.to_string() });
        state.running.remove(id.as_str());
        state.entries.remove(id.as_str());
        Ok(())
    }
}
