//! Queue error types.
//!
//! A duplicate admission is not an error: backends report it as `Ok(false)`.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::experiment::ExperimentError;

/// Errors surfaced by `Queue::schedule_fetch` and queue construction.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("module path is the unknown-module sentinel")]
    UnknownModulePath,

    #[error("queue configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("scheduling {module_path}@{version} (suffix {suffix:?}): {source}")]
    Admission {
        module_path: String,
        version: String,
        suffix: String,
        #[source]
        source: TaskServiceError,
    },

    #[error("queue is closed")]
    Closed,

    #[error("loading experiments: {0}")]
    Experiments(#[from] ExperimentError),
}

impl QueueError {
    /// Returns true if this error should be logged as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::UnknownModulePath | Self::Closed)
    }

    /// Returns true if this error is fatal to queue construction.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Experiments(_))
    }
}

/// Errors reported by the external task service.
#[derive(Debug, Error)]
pub enum TaskServiceError {
    /// A task with the same name exists or existed recently.
    #[error("task already exists")]
    AlreadyExists,

    #[error("task service returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("task service transport: {0}")]
    Transport(String),

    #[error("task service credentials: {0}")]
    Auth(String),

    #[error("task creation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for TaskServiceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
