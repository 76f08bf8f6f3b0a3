//! Keeps worker processes in step with workload status.
//!
//! | previous | new      | action                               |
//! |----------|----------|--------------------------------------|
//! | active   | inactive | stop the worker                      |
//! | inactive | active   | resume the registered worker         |
//! | (any)    | prepare  | compose arguments and launch afresh  |
//!
//! Deleting a workload removes its uploaded media (after containment checks)
//! and then tears the worker down whatever happened to the file.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::devices::DeviceCatalog;
use crate::core::supervisor::{LaunchRequest, StartOutcome, Supervisor};
use crate::core::validation::{resolve_contained_file, ContainedPath};
use crate::core::workload::{MediaSource, Workload, WorkloadHooks, WorkloadStatus};
use crate::error::{EdgeError, Result};

/// Marker asking the runtime to pick among the listed devices in order
const AUTO_DEVICE: &str = "AUTO";

/// Offset between a streaming worker's HTTP port and its pipeline port
const STREAM_PORT_OFFSET: u16 = 1000;

/// `--device` value: a single id verbatim, several as `AUTO:a,b,..` in priority order.
pub fn device_argument(devices: &[String]) -> Option<String> {
    match devices {
        [] => None,
        [single] => Some(single.clone()),
        many => Some(format!("{}:{}", AUTO_DEVICE, many.join(","))),
    }
}

/// Build the worker command line for `doc`.
///
/// `input` is the already resolved media input of a streaming workload.
pub fn compose_launch_args(doc: &Workload, input: Option<&str>) -> Result<Vec<String>> {
    let device = device_argument(&doc.devices).ok_or_else(|| {
        EdgeError::validation(format!("workload {} has no inference device", doc.id))
    })?;

    let mut args = vec![
        "--device".to_string(),
        device,
        "--model".to_string(),
        doc.model.clone(),
        "--port".to_string(),
        doc.port.to_string(),
        "--id".to_string(),
        doc.id.to_string(),
    ];

    if doc.usecase.is_streaming() {
        let tcp_port = doc.port.checked_add(STREAM_PORT_OFFSET).ok_or_else(|| {
            EdgeError::validation(format!(
                "port {} leaves no room for the stream port",
                doc.port
            ))
        })?;
        args.push("--tcp_port".to_string());
        args.push(tcp_port.to_string());

        if let Some(input) = input {
            args.push("--input".to_string());
            args.push(input.to_string());
        }
        match doc.metadata.num_streams() {
            Some(streams) if doc.usecase.accepts_stream_count() => {
                args.push("--number_of_streams".to_string());
                args.push(streams.to_string());
            }
            Some(_) => log::debug!(
                "Workload {}: {} takes no stream count, ignoring it",
                doc.id,
                doc.usecase
            ),
            None => {}
        }
    }

    Ok(args)
}

/// Resolved `--input` of a streaming worker
enum MediaInput {
    Capture(String),
    File(ContainedPath),
}

impl MediaInput {
    fn to_arg(&self) -> String {
        match self {
            MediaInput::Capture(device) => device.clone(),
            MediaInput::File(path) => path.as_path().to_string_lossy().into_owned(),
        }
    }
}

pub struct Reconciler {
    supervisor: Arc<Supervisor>,
    media_dir: PathBuf,
    assets_dir: PathBuf,
    catalog: Option<DeviceCatalog>,
    remove_uploads: bool,
}

impl Reconciler {
    pub fn new(supervisor: Arc<Supervisor>, media_dir: &Path, assets_dir: &Path) -> Self {
        Self {
            supervisor,
            media_dir: media_dir.to_path_buf(),
            assets_dir: assets_dir.to_path_buf(),
            catalog: None,
            remove_uploads: true,
        }
    }

    /// Leave uploaded media in place when a workload is deleted
    pub fn keep_uploads(mut self) -> Self {
        self.remove_uploads = false;
        self
    }

    /// Drop device selections the catalog does not know before launching
    pub fn with_catalog(mut self, catalog: DeviceCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    fn usable_devices(&self, doc: &Workload) -> Vec<String> {
        let Some(catalog) = &self.catalog else {
            return doc.devices.clone();
        };
        doc.devices
            .iter()
            .filter(|id| {
                let known = catalog.is_inference_device(id);
                if !known {
                    log::warn!(
                        "Workload {}: dropping unknown device '{}'",
                        doc.id,
                        id.escape_default()
                    );
                }
                known
            })
            .cloned()
            .collect()
    }

    fn resolve_input(&self, source: &MediaSource) -> Result<MediaInput> {
        let path = match source {
            MediaSource::Camera { id } => {
                let capture = self
                    .catalog
                    .as_ref()
                    .and_then(|c| c.get(id))
                    .and_then(|d| d.capture_path());
                return Ok(MediaInput::Capture(capture.unwrap_or_else(|| id.clone())));
            }
            MediaSource::Upload { name } => resolve_contained_file(&self.media_dir, name)?,
            MediaSource::Predefined { name } => resolve_contained_file(&self.assets_dir, name)?,
        };
        Ok(MediaInput::File(path))
    }

    /// Compose the launch request for a workload entering `prepare`.
    pub fn launch_request(&self, doc: &Workload) -> Result<LaunchRequest> {
        let mut effective = doc.clone();
        effective.devices = self.usable_devices(doc);

        let input = match (&doc.source, doc.usecase.is_streaming()) {
            (Some(source), true) => Some(self.resolve_input(source)?),
            _ => None,
        };
        let input_arg = input.as_ref().map(MediaInput::to_arg);

        let args = compose_launch_args(&effective, input_arg.as_deref())?;
        let request = LaunchRequest::new(doc.usecase.script_name(), args);
        Ok(match input {
            Some(MediaInput::File(path)) => request.with_contained_path(path),
            _ => request,
        })
    }

    async fn launch(&self, doc: &Workload) -> Result<StartOutcome> {
        let request = self.launch_request(doc)?;
        self.supervisor
            .start(&doc.id.to_string(), Some(request))
            .await
    }

    async fn resume(&self, doc: &Workload) -> Result<StartOutcome> {
        match self.supervisor.start(&doc.id.to_string(), None).await {
            // Never launched through this registry: start from the record
            Err(EdgeError::ProcessNotRegistered(_)) => self.launch(doc).await,
            other => other,
        }
    }

    /// Delete the workload's uploaded file if it is provably ours.
    ///
    /// Returns the removed path, or `None` when the source is not an upload.
    pub fn remove_owned_upload(&self, doc: &Workload) -> Result<Option<PathBuf>> {
        let Some(MediaSource::Upload { name }) = &doc.source else {
            return Ok(None);
        };
        let path = resolve_contained_file(&self.media_dir, name)?;
        fs::remove_file(path.as_path())?;
        Ok(Some(path.into_path_buf()))
    }
}

#[async_trait]
impl WorkloadHooks for Reconciler {
    async fn after_change(
        &self,
        previous: Option<&Workload>,
        doc: &Workload,
    ) -> Option<WorkloadStatus> {
        let previous_status = previous.map(|p| p.status);

        let result = match (previous_status, doc.status) {
            (Some(WorkloadStatus::Active), WorkloadStatus::Inactive) => {
                if let Err(e) = self.supervisor.stop(&doc.id.to_string()).await {
                    log::error!("Failed to stop workload {}: {}", doc.id, e);
                }
                return None;
            }
            (Some(WorkloadStatus::Inactive), WorkloadStatus::Active) => self.resume(doc).await,
            (_, WorkloadStatus::Prepare) => self.launch(doc).await,
            _ => return None,
        };

        match result {
            Ok(outcome) => {
                log::debug!("Workload {} start outcome: {:?}", doc.id, outcome);
                None
            }
            Err(e) => {
                log::error!("Failed to start workload {}: {}", doc.id, e);
                Some(WorkloadStatus::Failed)
            }
        }
    }

    async fn after_delete(&self, doc: &Workload) {
        if self.remove_uploads {
            match self.remove_owned_upload(doc) {
                Ok(Some(path)) => log::info!("Removed upload {}", path.display()),
                Ok(None) => {}
                Err(e) => log::warn!("Kept upload of workload {}: {}", doc.id, e),
            }
        } else if let Some(MediaSource::Upload { name }) = &doc.source {
            log::info!("Keeping upload '{}' of workload {}", name, doc.id);
        }

        if let Err(e) = self.supervisor.delete(&doc.id.to_string()).await {
            log::error!("Failed to tear down workload {}: {}", doc.id, e);
        }
    }
}
