//! Test run orchestration.
//!
//! A run moves `NotStarted -> Building -> Running` and ends in exactly one of
//! `Finished`, `TimedOut` or `Aborted`. The first terminal transition wins and
//! nothing about the run changes afterwards.
//!
//! Sandbox notifications arrive on one channel consumed by a single dispatcher
//! loop. The loop owns the idle watchdog and re-arms it on every notification.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use lantern_package::{
    file_url, HostPageBuilder, PackageBuildResult, PackageBuilder, RuntimeSupport,
    HOST_PAGE_FILE_NAME,
};
use lantern_runner::{
    notification_channel, Notification, NotificationReceiver, SandboxHandle, SandboxLauncher,
};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bridge::{decode, BridgeEvent};
use crate::cleanup::CleanupManager;
use crate::config::OrchestratorConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    ComposedOutcome, ExecutionResult, RunSettings, RunStartInfo, RunState, TestMethodIdentity,
    TestRequest,
};

/// File name of the built package inside a session directory.
pub const PACKAGE_FILE_NAME: &str = "lantern-test-run.zip";

/// Execution error recorded when the package could not be built.
pub const BUILD_FAILED_MESSAGE: &str = "Error while creating the test package";

#[derive(Debug, Default)]
struct RunShared {
    state: RunState,
    outcome: ComposedOutcome,
    started: Vec<TestMethodIdentity>,
    finished: Vec<TestMethodIdentity>,
    unfinished: Vec<TestMethodIdentity>,
    execution_errors: Vec<String>,
    settings_sent: bool,
    run_start_info: Option<RunStartInfo>,
    build_result: Option<PackageBuildResult>,
    run_was_complete: bool,
    execute_started: bool,
}

impl RunShared {
    /// Move to a non-terminal state unless the run already concluded.
    fn advance(&mut self, to: RunState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = to;
        true
    }

    /// Move to a terminal state. Only the first call has an effect.
    fn conclude(&mut self, to: RunState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        debug!("Run state {} -> {}", self.state, to);
        self.state = to;
        true
    }

    /// Apply one event. Returns whether the run is now concluded.
    fn record(&mut self, event: BridgeEvent) -> bool {
        if self.state.is_terminal() {
            return true;
        }

        match event {
            BridgeEvent::RunStarting(info) => {
                info!(
                    "Test run starting: {} assemblies, {} methods",
                    info.total_assemblies, info.total_methods
                );
                self.run_start_info = Some(info);
            }
            BridgeEvent::AssemblyStarting(name) => info!("Starting Assembly: {}", name),
            BridgeEvent::AssemblyFinished(name) => info!("Finished Assembly: {}", name),
            BridgeEvent::MethodStarting(identity) => {
                info!("[Started] {}", identity);
                self.started.push(identity);
            }
            BridgeEvent::MethodFinished(result) => {
                if !self.started.iter().any(|s| s.same_method(&result.identity)) {
                    warn!(
                        "Protocol violation: {} finished without having started",
                        result.identity
                    );
                }
                match &result.exception {
                    Some(exception) if !result.outcome.is_passed() => info!(
                        "{} [{}] {}",
                        result.identity, result.outcome, exception.message
                    ),
                    _ => info!("{} [{}]", result.identity, result.outcome),
                }
                self.finished.push(result.identity.clone());
                self.outcome.results.push(result);
            }
            BridgeEvent::LogMessage(text) => info!(target: "lantern::sandbox", "{}", text),
            BridgeEvent::ErrorOccurred(exception) => {
                error!("Testing error: {}", exception.message);
                self.execution_errors.push(exception.to_string());
            }
            BridgeEvent::RunFinished(outcome) => {
                self.conclude(RunState::Finished);
                self.run_was_complete = true;
                match outcome {
                    Some(outcome) => self.outcome = outcome,
                    None => warn!(
                        "Final results could not be read, keeping {} incremental results",
                        self.outcome.results.len()
                    ),
                }
                return true;
            }
            // Handled by the dispatcher, which has to talk to the sandbox.
            BridgeEvent::ReadyToStart => {}
        }
        false
    }

    fn time_out(&mut self) -> bool {
        if !self.conclude(RunState::TimedOut) {
            return false;
        }
        let finished = &self.finished;
        self.unfinished = self
            .started
            .iter()
            .filter(|s| !finished.iter().any(|f| f.same_method(s)))
            .cloned()
            .collect();
        true
    }

    fn snapshot(&self) -> ExecutionResult {
        ExecutionResult {
            run_state: self.state,
            composed_outcome: self.outcome.clone(),
            methods_started_but_not_finished: self.unfinished.clone(),
            execution_errors: self.execution_errors.clone(),
            package_build_result: self.build_result.clone(),
            run_start_info: self.run_start_info,
            run_was_complete: self.run_was_complete,
        }
    }
}

/// Aborts a run from any task or thread.
#[derive(Clone)]
pub struct AbortHandle {
    shared: Arc<Mutex<RunShared>>,
    wake: Arc<Notify>,
    done: watch::Receiver<bool>,
}

impl AbortHandle {
    /// Force the run into `Aborted`. Returns `false` when the run had already
    /// concluded, in which case nothing changes. Never blocks on the run.
    pub fn abort(&self) -> bool {
        let aborted = self.shared.lock().conclude(RunState::Aborted);
        if aborted {
            warn!("Test run aborted");
            self.wake.notify_one();
        }
        aborted
    }

    /// Abort and wait for the sandbox to be torn down and cleanup to finish,
    /// for at most `grace`. Returns whether teardown completed in time.
    pub async fn abort_and_wait(&self, grace: Duration) -> bool {
        self.abort();
        if !self.shared.lock().execute_started {
            return true;
        }
        let mut done = self.done.clone();
        let finished = matches!(
            tokio::time::timeout(grace, done.wait_for(|finished| *finished)).await,
            Ok(Ok(_))
        );
        finished
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().state
    }
}

/// Runs one test request inside a sandbox and collects its results.
///
/// One orchestrator drives exactly one run.
pub struct Orchestrator {
    config: OrchestratorConfig,
    launcher: Arc<dyn SandboxLauncher>,
    builder: PackageBuilder,
    host_pages: HostPageBuilder,
    cleanup: CleanupManager,
    shared: Arc<Mutex<RunShared>>,
    wake: Arc<Notify>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Orchestrator {
    /// Create an orchestrator. Loads the runtime support files from
    /// `config.runtime_dir` when it is set.
    pub fn new(config: OrchestratorConfig, launcher: Arc<dyn SandboxLauncher>) -> CoreResult<Self> {
        config.validate()?;

        let mut builder = PackageBuilder::new();
        if let Some(dir) = &config.runtime_dir {
            info!("Using runtime support files from {:?}", dir);
            builder = builder.with_runtime_support(RuntimeSupport::from_dir(dir)?);
        }

        let (done_tx, done_rx) = watch::channel(false);
        Ok(Self {
            config,
            launcher,
            builder,
            host_pages: HostPageBuilder::default(),
            cleanup: CleanupManager::new(),
            shared: Arc::new(Mutex::new(RunShared::default())),
            wake: Arc::new(Notify::new()),
            done_tx,
            done_rx,
        })
    }

    pub fn with_package_builder(mut self, builder: PackageBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_cleanup_manager(mut self, cleanup: CleanupManager) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn cleanup_manager(&self) -> &CleanupManager {
        &self.cleanup
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shared: self.shared.clone(),
            wake: self.wake.clone(),
            done: self.done_rx.clone(),
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().state
    }

    /// Execute a test request.
    ///
    /// Build failures, timeouts and aborts are reported through the returned
    /// [`ExecutionResult`]. An error is returned only when the run could not be
    /// carried out at all (session setup or sandbox launch failed).
    pub async fn execute(&self, request: &TestRequest) -> CoreResult<ExecutionResult> {
        {
            let mut shared = self.shared.lock();
            if shared.execute_started {
                return Err(CoreError::InvalidState(
                    "this orchestrator has already executed a run".to_string(),
                ));
            }
            shared.execute_started = true;
        }

        let outcome = self.run(request).await;

        if let Err(e) = &outcome {
            let mut shared = self.shared.lock();
            shared.conclude(RunState::Finished);
            shared.execution_errors.push(e.to_string());
        }

        if self.config.skip_cleanup {
            info!("Skipping cleanup, session files are kept");
        } else {
            self.cleanup.cleanup();
        }
        self.done_tx.send_replace(true);

        outcome?;

        let result = self.shared.lock().snapshot();
        log_summary(&result, &self.config);
        Ok(result)
    }

    async fn run(&self, request: &TestRequest) -> CoreResult<()> {
        let building = self.shared.lock().advance(RunState::Building);
        if !building {
            info!("Test run was aborted before it started");
            return Ok(());
        }

        let session_dir = self.config.work_dir.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&session_dir)?;
        self.cleanup.register_directory(&session_dir);
        debug!("Session directory {:?}", session_dir);

        let package_path = session_dir.join(PACKAGE_FILE_NAME);
        let build = {
            let builder = self.builder.clone();
            let request = request.clone();
            let output = package_path.clone();
            tokio::task::spawn_blocking(move || match request {
                TestRequest::FromPackage {
                    source_package_path,
                } => builder.build_from_existing_package(&source_package_path, &output),
                TestRequest::FromAssemblies {
                    test_assembly_paths,
                    referenced_file_paths,
                } => builder.build_from_assemblies(
                    &test_assembly_paths,
                    &referenced_file_paths,
                    &output,
                ),
            })
            .await?
        };

        if !build.success {
            for e in &build.errors {
                error!("{}", e);
            }
            let mut shared = self.shared.lock();
            shared.build_result = Some(build);
            if shared.conclude(RunState::Finished) {
                shared.execution_errors.push(BUILD_FAILED_MESSAGE.to_string());
            }
            return Ok(());
        }

        let settings = RunSettings {
            package_uri: file_url(&package_path)?.to_string(),
            test_assembly_file_names: build.test_assembly_file_names.iter().cloned().collect(),
            tag_filter: self.config.tag_filter.clone(),
            timeout_seconds: self.config.timeout_seconds,
        };
        self.shared.lock().build_result = Some(build);

        let page_url = self
            .host_pages
            .build(&package_path, &session_dir.join(HOST_PAGE_FILE_NAME))?;

        let running = self.shared.lock().advance(RunState::Running);
        if !running {
            info!("Test run was aborted before the sandbox started");
            return Ok(());
        }

        let (events_tx, events_rx) = notification_channel();
        let handle = self
            .launcher
            .launch(page_url.as_str(), events_tx)
            .await
            .map_err(|e| CoreError::LaunchFailed(e.to_string()))?;
        info!("Sandbox {} started with {}", self.launcher.name(), page_url);

        self.dispatch_loop(&handle, events_rx, &settings).await;
        self.tear_down(&handle).await;

        Ok(())
    }

    async fn dispatch_loop(
        &self,
        handle: &SandboxHandle,
        mut events: NotificationReceiver,
        settings: &RunSettings,
    ) {
        let timeout = self.config.timeout();
        let watchdog = tokio::time::sleep_until(deadline(timeout));
        tokio::pin!(watchdog);
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = self.wake.notified() => {
                    debug!("Dispatcher stopping, run is {}", self.state());
                    break;
                }
                received = events.recv(), if events_open => match received {
                    Some(notification) => {
                        watchdog.as_mut().reset(deadline(timeout));
                        if self.dispatch(&notification, handle, settings).await {
                            break;
                        }
                    }
                    None => {
                        events_open = false;
                        warn!("Sandbox {} closed its notification stream", handle);
                    }
                },
                _ = &mut watchdog => {
                    if self.shared.lock().time_out() {
                        warn!("No activity from the sandbox for {:?}, timing out", timeout);
                    }
                    break;
                }
            }
        }
    }

    /// Handle one notification. Returns whether the run has concluded.
    async fn dispatch(
        &self,
        notification: &Notification,
        handle: &SandboxHandle,
        settings: &RunSettings,
    ) -> bool {
        for event in decode(notification) {
            let concluded = match event {
                BridgeEvent::ReadyToStart => self.send_settings(handle, settings).await,
                other => self.shared.lock().record(other),
            };
            if concluded {
                return true;
            }
        }
        false
    }

    async fn send_settings(&self, handle: &SandboxHandle, settings: &RunSettings) -> bool {
        {
            let mut shared = self.shared.lock();
            if shared.state.is_terminal() {
                return true;
            }
            if std::mem::replace(&mut shared.settings_sent, true) {
                warn!("Protocol violation: sandbox reported ready again, settings were already sent");
                return false;
            }
        }

        info!("Sandbox ready, sending run settings");
        let delivered = match settings.to_json() {
            Ok(json) => self
                .launcher
                .send_settings(handle, &json)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(e) = delivered {
            error!("Could not send run settings: {}", e);
            self.shared
                .lock()
                .execution_errors
                .push(format!("Could not send run settings: {}", e));
        }
        false
    }

    async fn tear_down(&self, handle: &SandboxHandle) {
        let bound = self.config.teardown_bound();
        match tokio::time::timeout(bound, self.launcher.tear_down(handle)).await {
            Ok(Ok(())) => debug!("Sandbox {} torn down", handle),
            Ok(Err(e)) => warn!("Sandbox teardown failed: {}", e),
            Err(_) => warn!("Sandbox {} did not stop within {:?}", handle, bound),
        }
    }
}

/// Idle deadline `timeout` from now, clamped to a far future instead of
/// overflowing the clock.
fn deadline(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn log_summary(result: &ExecutionResult, config: &OrchestratorConfig) {
    let outcome = &result.composed_outcome;
    let announced = result
        .run_start_info
        .map(|i| format!(" of {} announced", i.total_methods))
        .unwrap_or_default();

    match result.run_state {
        RunState::Finished if result.build_failed() => {
            error!("Test package could not be built, no tests were run")
        }
        RunState::Finished => info!(
            "Test run finished: {} executed{}, {} passed, {} failed",
            outcome.results.len(),
            announced,
            outcome.passed_count(),
            outcome.failed_count()
        ),
        RunState::TimedOut => {
            warn!(
                "Test run timed out after {} seconds without activity: {} executed{}, {} started but not finished",
                config.timeout_seconds,
                outcome.results.len(),
                announced,
                result.methods_started_but_not_finished.len()
            );
            for identity in &result.methods_started_but_not_finished {
                warn!("  did not finish: {}", identity);
            }
        }
        RunState::Aborted => warn!(
            "Test run aborted: {} executed{}",
            outcome.results.len(),
            announced
        ),
        state => debug!("Run ended in state {}", state),
    }
}
