//! Sandbox hosted by an external process.
//!
//! The host program is started with the host page URL as its last argument.
//! It writes newline-delimited JSON notification envelopes to stdout and
//! receives the run settings as one JSON line on stdin. Stderr is logged.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::notification::{Notification, NotificationKind, NotificationSender};
use crate::sandbox::{SandboxHandle, SandboxLauncher};

/// Default program name of the sandbox host.
pub const DEFAULT_HOST_PROGRAM: &str = "lantern-sandbox-host";

/// Process sandbox options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSandboxOptions {
    /// Host program
    pub program: String,
    /// Arguments placed before the host page URL
    pub args: Vec<String>,
    /// How long the host gets to exit after its stdin is closed
    pub teardown_grace: Duration,
}

impl Default for ProcessSandboxOptions {
    fn default() -> Self {
        Self {
            program: DEFAULT_HOST_PROGRAM.to_string(),
            args: Vec::new(),
            teardown_grace: Duration::from_secs(5),
        }
    }
}

impl ProcessSandboxOptions {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }
}

struct HostProcess {
    child: Child,
    stdin: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
    readers: Vec<JoinHandle<()>>,
}

/// Sandbox launcher that runs an external host program.
pub struct ProcessSandbox {
    options: ProcessSandboxOptions,
    hosts: Mutex<HashMap<String, HostProcess>>,
}

impl ProcessSandbox {
    pub fn new(options: ProcessSandboxOptions) -> Self {
        Self {
            options,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ProcessSandboxOptions {
        &self.options
    }
}

#[async_trait]
impl SandboxLauncher for ProcessSandbox {
    fn name(&self) -> &str {
        &self.options.program
    }

    async fn launch(
        &self,
        page_url: &str,
        events: NotificationSender,
    ) -> RunnerResult<SandboxHandle> {
        let handle = SandboxHandle::new(page_url);
        info!("Starting sandbox host {} for {}", self.options.program, page_url);

        let mut cmd = Command::new(&self.options.program);
        cmd.args(&self.options.args)
            .arg(page_url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            RunnerError::LaunchFailed(format!("Failed to spawn {}: {}", self.options.program, e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::LaunchFailed("host stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::LaunchFailed("host stderr unavailable".to_string()))?;
        let stdin = child.stdin.take();

        let stdout_reader = tokio::spawn({
            let id = handle.id.clone();
            async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if events.send(Notification::from_line(line)).is_err() {
                                debug!("[{}] Notification receiver closed", id);
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("[{}] Sandbox host closed its output", id);
                            break;
                        }
                        Err(e) => {
                            let _ = events.send(Notification::new(
                                NotificationKind::ErrorOccurred,
                                format!("Failed to read sandbox output: {}", e),
                            ));
                            break;
                        }
                    }
                }
            }
        });

        let stderr_reader = tokio::spawn({
            let id = handle.id.clone();
            async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] [stderr] {}", id, line);
                }
            }
        });

        self.hosts.lock().insert(
            handle.id.clone(),
            HostProcess {
                child,
                stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
                readers: vec![stdout_reader, stderr_reader],
            },
        );

        Ok(handle)
    }

    async fn send_settings(&self, handle: &SandboxHandle, settings: &str) -> RunnerResult<()> {
        let stdin = self
            .hosts
            .lock()
            .get(&handle.id)
            .map(|host| host.stdin.clone())
            .ok_or_else(|| RunnerError::NotRunning(handle.id.clone()))?;

        let mut guard = stdin.lock().await;
        let pipe = guard
            .as_mut()
            .ok_or_else(|| RunnerError::SettingsFailed("host stdin is closed".to_string()))?;

        let mut line = settings.replace('\n', " ");
        line.push('\n');
        pipe.write_all(line.as_bytes())
            .await
            .map_err(|e| RunnerError::SettingsFailed(e.to_string()))?;
        pipe.flush()
            .await
            .map_err(|e| RunnerError::SettingsFailed(e.to_string()))?;

        debug!("[{}] Run settings delivered", handle.id);
        Ok(())
    }

    async fn tear_down(&self, handle: &SandboxHandle) -> RunnerResult<()> {
        let Some(mut host) = self.hosts.lock().remove(&handle.id) else {
            debug!("[{}] Sandbox already stopped", handle.id);
            return Ok(());
        };

        // Closing stdin asks the host to exit on its own.
        host.stdin.lock().await.take();

        let grace = self.options.teardown_grace;
        let result = match tokio::time::timeout(grace, host.child.wait()).await {
            Ok(Ok(status)) => {
                info!("[{}] Sandbox host exited with {}", handle.id, status);
                Ok(())
            }
            Ok(Err(e)) => Err(RunnerError::Io(e)),
            Err(_) => {
                warn!(
                    "[{}] Sandbox host still running after {:?}, killing it",
                    handle.id, grace
                );
                match tokio::time::timeout(grace, host.child.kill()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(RunnerError::Io(e)),
                    Err(_) => Err(RunnerError::TearDownTimeout(grace.as_secs())),
                }
            }
        };

        for reader in host.readers {
            reader.abort();
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = ProcessSandboxOptions::new("chromium")
            .arg("--headless")
            .teardown_grace(Duration::from_secs(2));

        assert_eq!(options.program, "chromium");
        assert_eq!(options.args, vec!["--headless".to_string()]);
        assert_eq!(options.teardown_grace, Duration::from_secs(2));
        assert_eq!(ProcessSandboxOptions::default().program, DEFAULT_HOST_PROGRAM);
    }

    #[tokio::test]
    async fn test_launch_missing_program_fails() {
        let sandbox = ProcessSandbox::new(ProcessSandboxOptions::new(
            "lantern-no-such-host-program-for-tests",
        ));
        let (tx, _rx) = crate::notification::notification_channel();

        let err = sandbox.launch("file:///tmp/page.html", tx).await.unwrap_err();
        assert!(matches!(err, RunnerError::LaunchFailed(_)));
    }

    #[tokio::test]
    async fn test_tear_down_unknown_handle_is_ok() {
        let sandbox = ProcessSandbox::new(ProcessSandboxOptions::default());
        let handle = SandboxHandle::new("file:///tmp/page.html");
        assert!(sandbox.tear_down(&handle).await.is_ok());
        assert!(matches!(
            sandbox.send_settings(&handle, "{}").await,
            Err(RunnerError::NotRunning(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tear_down_kills_host_ignoring_stdin() {
        let sandbox = ProcessSandbox::new(
            ProcessSandboxOptions::new("sh")
                .arg("-c")
                .arg("sleep 30")
                .teardown_grace(Duration::from_millis(200)),
        );
        let (tx, _rx) = crate::notification::notification_channel();
        let handle = sandbox.launch("file:///tmp/page.html", tx).await.unwrap();

        let started = std::time::Instant::now();
        assert!(sandbox.tear_down(&handle).await.is_ok());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(sandbox.tear_down(&handle).await.is_ok());
    }
}
