use std::io;
use thiserror::Error;

/// Custom error type for the edgeboard core
#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    #[error("Worker launch failed: {0}")]
    Launch(String),

    #[error("No process registered for workload {0}")]
    ProcessNotRegistered(String),

    #[error("Process registry error: {0}")]
    Registry(String),

    #[error("Device discovery failed: {0}")]
    Discovery(String),

    #[error("Metric collection failed: {0}")]
    MetricCollection(String),

    #[error("Workload not found: {0}")]
    WorkloadNotFound(u64),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for the edgeboard core
pub type Result<T> = std::result::Result<T, EdgeError>;

impl EdgeError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        EdgeError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        EdgeError::Validation(msg.into())
    }

    pub fn path_traversal<S: Into<String>>(msg: S) -> Self {
        EdgeError::PathTraversal(msg.into())
    }

    /// Create a launch error (fatal to the operation, surfaces as `failed`)
    pub fn launch<S: Into<String>>(msg: S) -> Self {
        EdgeError::Launch(msg.into())
    }

    pub fn not_registered<S: Into<String>>(id: S) -> Self {
        EdgeError::ProcessNotRegistered(id.into())
    }

    pub fn registry<S: Into<String>>(msg: S) -> Self {
        EdgeError::Registry(msg.into())
    }

    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        EdgeError::Discovery(msg.into())
    }

    pub fn metric_collection<S: Into<String>>(msg: S) -> Self {
        EdgeError::MetricCollection(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        EdgeError::Other(msg.into())
    }

    /// Whether this error was a rejected input rather than an external failure
    pub fn is_validation(&self) -> bool {
        matches!(self, EdgeError::Validation(_) | EdgeError::PathTraversal(_))
    }
}
