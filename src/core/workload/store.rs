// JSON-file workload store.
// Every mutation is persisted before hooks run; hook status write-backs are
// persisted afterwards without re-firing the hooks.
// A detached store works on an in-memory copy of the file and never writes it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{MediaSource, Usecase, UsecaseMetadata, Workload, WorkloadHooks, WorkloadStatus};
use crate::error::{EdgeError, Result};

/// Fields supplied when a workload is created; id and status are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkload {
    pub task: String,
    pub usecase: Usecase,
    pub model: String,
    pub devices: Vec<String>,
    pub source: Option<MediaSource>,
    pub port: u16,
    pub metadata: UsecaseMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    workloads: Vec<Workload>,
}

enum Backing {
    File(PathBuf),
    Detached(Mutex<StoreFile>),
}

pub struct WorkloadStore {
    backing: Backing,
    hooks: Arc<dyn WorkloadHooks>,
    write_lock: tokio::sync::Mutex<()>,
}

impl WorkloadStore {
    pub fn new(path: &Path, hooks: Arc<dyn WorkloadHooks>) -> Self {
        Self {
            backing: Backing::File(path.to_path_buf()),
            hooks,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Snapshot of the store at `path` whose changes stay in memory.
    ///
    /// Hooks still fire, so a dry run shows what a real change would trigger.
    pub fn detached_copy(path: &Path, hooks: Arc<dyn WorkloadHooks>) -> Result<Self> {
        let file = read_store_file(path)?;
        Ok(Self {
            backing: Backing::Detached(Mutex::new(file)),
            hooks,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn load(&self) -> Result<StoreFile> {
        match &self.backing {
            Backing::File(path) => read_store_file(path),
            Backing::Detached(file) => Ok(file.lock().clone()),
        }
    }

    fn save(&self, file: &StoreFile) -> Result<()> {
        let path = match &self.backing {
            Backing::File(path) => path,
            Backing::Detached(copy) => {
                *copy.lock() = file.clone();
                return Ok(());
            }
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(file)?)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Workload>> {
        Ok(self.load()?.workloads)
    }

    pub fn get(&self, id: u64) -> Result<Workload> {
        self.load()?
            .workloads
            .into_iter()
            .find(|w| w.id == id)
            .ok_or(EdgeError::WorkloadNotFound(id))
    }

    /// Insert a new record in `prepare` and let the hooks launch it.
    pub async fn create(&self, new: NewWorkload) -> Result<Workload> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load()?;
        file.next_id = file.next_id.max(file.workloads.iter().map(|w| w.id).max().unwrap_or(0)) + 1;

        let doc = Workload {
            id: file.next_id,
            task: new.task,
            usecase: new.usecase,
            model: new.model,
            devices: new.devices,
            source: new.source,
            port: new.port,
            metadata: new.metadata,
            status: WorkloadStatus::Prepare,
        };
        file.workloads.push(doc.clone());
        self.save(&file)?;
        log::info!("Created workload {} ({})", doc.id, doc.usecase);

        let write_back = self.hooks.after_change(None, &doc).await;
        self.apply_write_back(doc, write_back)
    }

    /// Change the status of a record and fire `after_change`.
    pub async fn update_status(&self, id: u64, status: WorkloadStatus) -> Result<Workload> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load()?;
        let slot = file
            .workloads
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(EdgeError::WorkloadNotFound(id))?;

        let previous = slot.clone();
        slot.status = status;
        let doc = slot.clone();
        self.save(&file)?;

        let write_back = self.hooks.after_change(Some(&previous), &doc).await;
        self.apply_write_back(doc, write_back)
    }

    /// Remove a record and fire `after_delete`.
    pub async fn delete(&self, id: u64) -> Result<Workload> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load()?;
        let index = file
            .workloads
            .iter()
            .position(|w| w.id == id)
            .ok_or(EdgeError::WorkloadNotFound(id))?;

        let doc = file.workloads.remove(index);
        self.save(&file)?;
        log::info!("Deleted workload {}", id);

        self.hooks.after_delete(&doc).await;
        Ok(doc)
    }

    fn apply_write_back(
        &self,
        mut doc: Workload,
        write_back: Option<WorkloadStatus>,
    ) -> Result<Workload> {
        let Some(status) = write_back.filter(|s| *s != doc.status) else {
            return Ok(doc);
        };

        let mut file = self.load()?;
        if let Some(slot) = file.workloads.iter_mut().find(|w| w.id == doc.id) {
            slot.status = status;
            self.save(&file)?;
        }
        log::info!("Workload {} is now {}", doc.id, status);
        doc.status = status;
        Ok(doc)
    }
}

fn read_store_file(path: &Path) -> Result<StoreFile> {
    if !path.exists() {
        return Ok(StoreFile::default());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(StoreFile::default());
    }
    Ok(serde_json::from_str(&content)?)
}
