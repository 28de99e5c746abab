//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while orchestrating a test run.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid orchestrator state: {0}")]
    InvalidState(String),

    #[error("Could not launch the sandbox: {0}")]
    LaunchFailed(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Package error: {0}")]
    Package(#[from] lantern_package::PackageError),

    #[error("Package build task failed: {0}")]
    BuildTask(#[from] tokio::task::JoinError),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
