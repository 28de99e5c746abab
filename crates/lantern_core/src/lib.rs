//! # lantern_core
//!
//! Test run orchestration for lantern.
//!
//! This crate turns a test request into a package, drives the sandbox that
//! executes it, collects the harness notifications into results and writes the
//! XML report.
//!
//! # Architecture
//!
//! - **Orchestrator**: builds the package, launches the sandbox and runs the
//!   single dispatcher loop with the idle watchdog
//! - **Bridge**: decodes raw notifications into typed events
//! - **Cleanup**: removes session files once the run is over
//! - **Report**: serializes an [`ExecutionResult`] as NUnit 2.5 style XML
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lantern_core::{Orchestrator, OrchestratorConfig, ReportWriter, TestRequest};
//! use lantern_runner::{ProcessSandbox, ProcessSandboxOptions};
//!
//! # async fn run() -> lantern_core::CoreResult<()> {
//! let config = OrchestratorConfig::new().timeout_seconds(120);
//! let sandbox = Arc::new(ProcessSandbox::new(ProcessSandboxOptions::new("lantern-sandbox-host")));
//! let orchestrator = Orchestrator::new(config, sandbox)?;
//!
//! let request = TestRequest::from_assembly_patterns(&["bin/*.Tests.dll"], &[])?;
//! let result = orchestrator.execute(&request).await?;
//!
//! ReportWriter::new().write_to(&result, "TestResults.xml".as_ref())?;
//! println!("{:?}", result.verdict());
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod report;

// Re-export main types for convenience
pub use bridge::{decode, AssemblyInfo, BridgeEvent};
pub use cleanup::CleanupManager;
pub use config::{
    OrchestratorConfig, SandboxHostConfig, MAX_TEARDOWN_GRACE_SECONDS, MAX_TIMEOUT_SECONDS,
};
pub use error::{CoreError, CoreResult};
pub use model::{
    ComposedOutcome, ExceptionInfo, ExecutionResult, Outcome, RunSettings, RunStartInfo,
    RunState, ScenarioResult, TestMethodIdentity, TestRequest, Verdict, DEFAULT_TIMEOUT_SECONDS,
};
pub use orchestrator::{AbortHandle, Orchestrator, BUILD_FAILED_MESSAGE, PACKAGE_FILE_NAME};
pub use report::{filter_stack_trace, ReportEnvironment, ReportWriter};
