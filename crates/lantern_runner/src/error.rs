//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while hosting a sandbox.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Sandbox launch failed: {0}")]
    LaunchFailed(String),

    #[error("Sandbox {0} is not running")]
    NotRunning(String),

    #[error("Could not deliver run settings: {0}")]
    SettingsFailed(String),

    #[error("Sandbox did not exit within {0} seconds")]
    TearDownTimeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
