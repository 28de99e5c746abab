//! Mock sandbox for testing.
//!
//! Plays a scripted sequence of notifications instead of hosting a real
//! sandbox, and captures every call for verification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{RunnerError, RunnerResult};
use crate::notification::{Notification, NotificationKind, NotificationSender};
use crate::sandbox::{SandboxHandle, SandboxLauncher};

/// One step of a mock sandbox script.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit a notification.
    Notify(Notification),
    /// Stay silent for a while.
    Delay(Duration),
    /// Block until run settings are delivered.
    WaitForSettings,
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub handle: Option<String>,
    pub page_url: Option<String>,
    pub payload: Option<String>,
}

/// Mock sandbox launcher for testing.
///
/// After its script runs out the sandbox stays alive and silent until it is
/// torn down.
#[derive(Clone, Default)]
pub struct MockSandbox {
    script: Arc<RwLock<Vec<ScriptStep>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    launch_failure: Arc<RwLock<Option<String>>>,
    settings_delivered: Arc<Notify>,
    players: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the script.
    pub fn with_script(self, steps: Vec<ScriptStep>) -> Self {
        *self.script.write() = steps;
        self
    }

    /// Append a notification.
    pub fn notify(self, kind: NotificationKind, payload: impl Into<String>) -> Self {
        self.script
            .write()
            .push(ScriptStep::Notify(Notification::new(kind, payload)));
        self
    }

    /// Append a silent pause.
    pub fn delay(self, duration: Duration) -> Self {
        self.script.write().push(ScriptStep::Delay(duration));
        self
    }

    /// Append a wait for run settings.
    pub fn wait_for_settings(self) -> Self {
        self.script.write().push(ScriptStep::WaitForSettings);
        self
    }

    /// Make every launch fail.
    pub fn simulate_launch_failure(self, message: impl Into<String>) -> Self {
        *self.launch_failure.write() = Some(message.into());
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Payloads of every `send_settings` call.
    pub fn settings_payloads(&self) -> Vec<String> {
        self.get_method_calls("send_settings")
            .into_iter()
            .filter_map(|c| c.payload)
            .collect()
    }

    /// Number of sandboxes launched and not yet torn down.
    pub fn running_count(&self) -> usize {
        self.players.read().len()
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }
}

#[async_trait]
impl SandboxLauncher for MockSandbox {
    fn name(&self) -> &str {
        "mock"
    }

    async fn launch(
        &self,
        page_url: &str,
        events: NotificationSender,
    ) -> RunnerResult<SandboxHandle> {
        let handle = SandboxHandle::new(page_url);
        self.record_call(CapturedCall {
            method: "launch".to_string(),
            handle: Some(handle.id.clone()),
            page_url: Some(page_url.to_string()),
            payload: None,
        });

        if let Some(msg) = self.launch_failure.read().clone() {
            return Err(RunnerError::LaunchFailed(msg));
        }

        let script = self.script.read().clone();
        let settings = self.settings_delivered.clone();
        let player = tokio::spawn(async move {
            for step in script {
                match step {
                    ScriptStep::Notify(notification) => {
                        if events.send(notification).is_err() {
                            return;
                        }
                    }
                    ScriptStep::Delay(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::WaitForSettings => settings.notified().await,
                }
            }
            // Keep the channel open like a live sandbox would.
            std::future::pending::<()>().await;
        });

        self.players.write().insert(handle.id.clone(), player);
        Ok(handle)
    }

    async fn send_settings(&self, handle: &SandboxHandle, settings: &str) -> RunnerResult<()> {
        self.record_call(CapturedCall {
            method: "send_settings".to_string(),
            handle: Some(handle.id.clone()),
            page_url: None,
            payload: Some(settings.to_string()),
        });

        if !self.players.read().contains_key(&handle.id) {
            return Err(RunnerError::NotRunning(handle.id.clone()));
        }
        self.settings_delivered.notify_one();
        Ok(())
    }

    async fn tear_down(&self, handle: &SandboxHandle) -> RunnerResult<()> {
        self.record_call(CapturedCall {
            method: "tear_down".to_string(),
            handle: Some(handle.id.clone()),
            page_url: None,
            payload: None,
        });

        if let Some(player) = self.players.write().remove(&handle.id) {
            player.abort();
        }
        Ok(())
    }
}
