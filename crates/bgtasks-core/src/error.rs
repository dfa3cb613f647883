//! Error types for BGTasks.

use thiserror::Error;

/// Unified error type.
#[derive(Debug, Error)]
pub enum BgTasksError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, BgTasksError>;
