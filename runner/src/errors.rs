//! Error types for the Deployr runner

use thiserror::Error;

/// Main error type for the runner
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Non-success response from the control plane
    #[error("Control plane error: {0}")]
    ControlPlaneError(String),

    #[error("Failed to claim job: {0}")]
    ClaimError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Failed to clone repository: {0}")]
    CloneError(String),

    #[error("Git sync failed: {0}")]
    SyncError(String),

    #[error("Unknown framework")]
    UnknownFramework,

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Command timed out after {0}s: {1}")]
    CommandTimeout(u64, String),

    #[error("SSH error: {0}")]
    SshError(String),

    #[error("Invalid state transition: {0}")]
    StateError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunnerError {
    /// Transport-level errors never fail a job on their own
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RunnerError::HttpError(_) | RunnerError::ControlPlaneError(_) | RunnerError::ClaimError(_)
        )
    }
}
