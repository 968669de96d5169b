//! Error types for Gatehouse.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Pipeline errors
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidPipeline(String),

    #[error("Stage not found: {pipeline}/{stage}")]
    StageNotFound { pipeline: String, stage: String },

    // Scheduling errors
    #[error("Build cause for pipeline {pipeline} is stale: {reason}")]
    StaleBuildCause { pipeline: String, reason: String },

    // Lock errors
    #[error("Pipeline {pipeline} is locked by {holder}")]
    PipelineLocked { pipeline: String, holder: String },

    #[error("Lock of pipeline {pipeline} changed since it was read")]
    LockChanged { pipeline: String },

    #[error("Lock listener failed: {0}")]
    Listener(String),

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is the expected staleness race signalled by persistence.
    pub fn is_stale_build_cause(&self) -> bool {
        matches!(self, Error::StaleBuildCause { .. })
    }

    /// Whether a commit lost a race on the pipeline lock row.
    pub fn is_lock_changed(&self) -> bool {
        matches!(self, Error::LockChanged { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
