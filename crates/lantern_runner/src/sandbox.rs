//! Sandbox launcher trait and types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RunnerResult;
use crate::notification::NotificationSender;

/// Identifies one launched sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxHandle {
    /// Unique instance ID
    pub id: String,
    /// Host page the sandbox was started with
    pub page_url: String,
}

impl SandboxHandle {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            page_url: page_url.into(),
        }
    }
}

impl std::fmt::Display for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Hosts the sandboxed runtime that executes a test package.
///
/// Implementations push every notification the in-sandbox harness emits into
/// the sender handed over at launch, in the order it was emitted.
#[async_trait]
pub trait SandboxLauncher: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Start a sandbox loading the given host page.
    async fn launch(&self, page_url: &str, events: NotificationSender)
        -> RunnerResult<SandboxHandle>;

    /// Deliver the serialized run settings into a running sandbox.
    async fn send_settings(&self, handle: &SandboxHandle, settings: &str) -> RunnerResult<()>;

    /// Stop a sandbox. Tearing down an unknown or already stopped handle succeeds.
    async fn tear_down(&self, handle: &SandboxHandle) -> RunnerResult<()>;
}
