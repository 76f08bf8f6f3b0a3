//! Workload records and the hooks fired when they change.

mod store;

pub use store::{NewWorkload, WorkloadStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EdgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    Prepare,
    Active,
    Inactive,
    Failed,
}

impl WorkloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadStatus::Prepare => "prepare",
            WorkloadStatus::Active => "active",
            WorkloadStatus::Inactive => "inactive",
            WorkloadStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadStatus {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prepare" => Ok(WorkloadStatus::Prepare),
            "active" => Ok(WorkloadStatus::Active),
            "inactive" => Ok(WorkloadStatus::Inactive),
            "failed" => Ok(WorkloadStatus::Failed),
            other => Err(EdgeError::validation(format!(
                "unknown workload status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Usecase {
    TextGeneration,
    TextToImage,
    AutomaticSpeechRecognition,
    TextToSpeech,
    ObjectDetection,
    InstanceSegmentation,
}

impl Usecase {
    pub const ALL: [Usecase; 6] = [
        Usecase::TextGeneration,
        Usecase::TextToImage,
        Usecase::AutomaticSpeechRecognition,
        Usecase::TextToSpeech,
        Usecase::ObjectDetection,
        Usecase::InstanceSegmentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Usecase::TextGeneration => "text-generation",
            Usecase::TextToImage => "text-to-image",
            Usecase::AutomaticSpeechRecognition => "automatic-speech-recognition",
            Usecase::TextToSpeech => "text-to-speech",
            Usecase::ObjectDetection => "object-detection",
            Usecase::InstanceSegmentation => "instance-segmentation",
        }
    }

    /// Worker folder under `workers_dir` serving this usecase
    pub fn script_name(&self) -> &'static str {
        match self {
            Usecase::ObjectDetection => "dlstreamer",
            other => other.as_str(),
        }
    }

    /// Streaming workers run a media pipeline on a second TCP port
    pub fn is_streaming(&self) -> bool {
        matches!(self, Usecase::ObjectDetection | Usecase::InstanceSegmentation)
    }

    /// Whether the worker takes `--number_of_streams`
    pub fn accepts_stream_count(&self) -> bool {
        matches!(self, Usecase::InstanceSegmentation)
    }
}

impl fmt::Display for Usecase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Usecase {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self> {
        Usecase::ALL
            .into_iter()
            .find(|u| u.as_str() == s)
            .ok_or_else(|| EdgeError::validation(format!("unknown usecase '{}'", s)))
    }
}

/// Input media of a streaming workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaSource {
    /// Capture device id, e.g. `camera:0`
    Camera { id: String },
    /// File uploaded into the trusted media directory, owned by the workload
    Upload { name: String },
    /// Bundled sample asset
    Predefined { name: String },
}

impl MediaSource {
    /// Parse the CLI shorthand `camera:<id>`, `upload:<name>` or `predefined:<name>`
    pub fn parse(value: &str) -> Result<Self> {
        let (kind, rest) = value
            .split_once(':')
            .ok_or_else(|| EdgeError::validation(format!("media source '{}' has no type", value)))?;
        if rest.is_empty() {
            return Err(EdgeError::validation("media source name cannot be empty"));
        }
        match kind {
            "camera" => Ok(MediaSource::Camera {
                id: format!("camera:{}", rest),
            }),
            "upload" => Ok(MediaSource::Upload {
                name: rest.to_string(),
            }),
            "predefined" => Ok(MediaSource::Predefined {
                name: rest.to_string(),
            }),
            other => Err(EdgeError::validation(format!(
                "unknown media source type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UsecaseMetadata {
    #[default]
    None,
    Streaming { num_streams: u32 },
}

impl UsecaseMetadata {
    pub fn num_streams(&self) -> Option<u32> {
        match self {
            UsecaseMetadata::Streaming { num_streams } => Some(*num_streams),
            UsecaseMetadata::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub id: u64,
    pub task: String,
    pub usecase: Usecase,
    pub model: String,
    /// Ordered priority list of inference device ids
    pub devices: Vec<String>,
    #[serde(default)]
    pub source: Option<MediaSource>,
    pub port: u16,
    #[serde(default)]
    pub metadata: UsecaseMetadata,
    pub status: WorkloadStatus,
}

/// Reactions to persisted workload changes.
///
/// `after_change` may return a status to write back to the record (a
/// failed launch becomes `failed`). Neither hook can fail the write that
/// triggered it.
#[async_trait]
pub trait WorkloadHooks: Send + Sync {
    async fn after_change(
        &self,
        previous: Option<&Workload>,
        doc: &Workload,
    ) -> Option<WorkloadStatus>;

    async fn after_delete(&self, doc: &Workload);
}
