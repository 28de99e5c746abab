//! Orchestrator configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::model::DEFAULT_TIMEOUT_SECONDS;

/// Largest accepted idle timeout, one day.
pub const MAX_TIMEOUT_SECONDS: u64 = 86_400;

/// Largest accepted teardown grace, one hour.
pub const MAX_TEARDOWN_GRACE_SECONDS: u64 = 3_600;

/// Sandbox host program settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxHostConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for SandboxHostConfig {
    fn default() -> Self {
        Self {
            program: lantern_runner::DEFAULT_HOST_PROGRAM.to_string(),
            args: Vec::new(),
        }
    }
}

/// Configuration of a test run.
///
/// Loaded from a TOML file when one is given; every field has a default.
///
/// ```toml
/// work_dir = "/tmp/lantern"
/// timeout_seconds = 120
/// tag_filter = "Smoke"
///
/// [sandbox]
/// program = "lantern-sandbox-host"
/// args = ["--headless"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Parent of the per-run session directories
    pub work_dir: PathBuf,
    /// Idle timeout: the run times out after this many seconds without a notification
    pub timeout_seconds: u64,
    pub tag_filter: Option<String>,
    /// Keep session directories after the run
    pub skip_cleanup: bool,
    /// Upper bound for sandbox teardown and `abort_and_wait`
    pub teardown_grace_seconds: u64,
    /// Directory with harness binaries replacing the embedded runtime support files
    pub runtime_dir: Option<PathBuf>,
    pub sandbox: SandboxHostConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("lantern"),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            tag_filter: None,
            skip_cleanup: false,
            teardown_grace_seconds: 5,
            runtime_dir: None,
            sandbox: SandboxHostConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse a configuration from TOML.
    pub fn from_toml(content: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.timeout_seconds == 0 {
            return Err(CoreError::InvalidConfig(
                "timeout_seconds must be a positive number".to_string(),
            ));
        }
        if self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(CoreError::InvalidConfig(format!(
                "timeout_seconds must not exceed {}",
                MAX_TIMEOUT_SECONDS
            )));
        }
        if self.teardown_grace_seconds > MAX_TEARDOWN_GRACE_SECONDS {
            return Err(CoreError::InvalidConfig(format!(
                "teardown_grace_seconds must not exceed {}",
                MAX_TEARDOWN_GRACE_SECONDS
            )));
        }
        if self.sandbox.program.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "sandbox program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn tag_filter(mut self, filter: impl Into<String>) -> Self {
        self.tag_filter = Some(filter.into());
        self
    }

    pub fn skip_cleanup(mut self, skip: bool) -> Self {
        self.skip_cleanup = skip;
        self
    }

    pub fn teardown_grace_seconds(mut self, seconds: u64) -> Self {
        self.teardown_grace_seconds = seconds;
        self
    }

    pub fn runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = Some(dir.into());
        self
    }

    pub fn sandbox_program(mut self, program: impl Into<String>) -> Self {
        self.sandbox.program = program.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_secs(self.teardown_grace_seconds)
    }

    /// Upper bound for a whole sandbox teardown: the host's grace to exit
    /// plus the same again to kill it.
    pub fn teardown_bound(&self) -> Duration {
        self.teardown_grace()
            .saturating_mul(2)
            .saturating_add(Duration::from_secs(1))
    }
}
