//! CLI command definitions.
//!
//! Both subcommands build a [`TestRequest`] and hand it to [`run_tests`],
//! which owns the orchestrator, signal handling and the report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use lantern_core::{
    CoreError, Orchestrator, OrchestratorConfig, ReportWriter, TestRequest, MAX_TIMEOUT_SECONDS,
};
use lantern_runner::{ProcessSandbox, ProcessSandboxOptions};
use tracing::{error, info, warn};

use crate::signal::SignalHandler;
use crate::ExitCodes;

pub mod assemblies;
pub mod package;

/// lantern - run sandboxed test packages from the command line
#[derive(Parser)]
#[command(name = "lantern")]
#[command(version, about = "lantern - run sandboxed test packages from the command line")]
#[command(long_about = r#"
lantern builds a test package, runs it inside a sandbox host and writes an
NUnit style XML report of the results.

MODES:
  package     → Re-package and run an existing test package
  assemblies  → Build a package from test assemblies and their references

EXIT CODES:
  0 - All tests passed
  1 - Failing tests
  2 - Invalid arguments
  3 - No tests executed
  4 - Timed out
  5 - Aborted
  6 - Build or execution error
"#)]
#[command(propagate_version = true, arg_required_else_help = true)]
pub struct Cli {
    /// Enable debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write the log to this file (truncated on start)
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the tests of an existing package
    Package(package::PackageArgs),

    /// Build a package from test assemblies and run it
    Assemblies(assemblies::AssembliesArgs),
}

/// Options shared by every run.
#[derive(Args, Debug, Default)]
pub struct RunOptions {
    /// Path of the XML report
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Only run tests carrying this tag
    #[arg(long)]
    pub tag_filter: Option<String>,

    /// Seconds without sandbox activity before the run times out
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECONDS))]
    pub timeout: Option<u64>,

    /// Directory for per-run session files
    #[arg(long, env = "LANTERN_WORK_DIR", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Keep session files after the run
    #[arg(long)]
    pub skip_cleanup: bool,

    /// TOML configuration file, overridden by command line flags
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Program hosting the sandbox
    #[arg(long, env = "LANTERN_SANDBOX_HOST", value_name = "CMD")]
    pub sandbox_host: Option<String>,

    /// Extra argument passed to the sandbox host, repeatable
    #[arg(long = "sandbox-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub sandbox_args: Vec<String>,

    /// Directory with harness binaries replacing the built-in ones
    #[arg(long, value_name = "DIR")]
    pub runtime_dir: Option<PathBuf>,
}

impl RunOptions {
    /// Configuration file values with command line overrides applied.
    pub fn to_config(&self) -> Result<OrchestratorConfig> {
        let mut config = match &self.config {
            Some(path) => OrchestratorConfig::from_file(path).map_err(|e| {
                CoreError::InvalidConfig(format!("{}: {}", path.display(), e))
            })?,
            None => OrchestratorConfig::default(),
        };

        if let Some(dir) = &self.work_dir {
            config = config.work_dir(dir);
        }
        if let Some(seconds) = self.timeout {
            config = config.timeout_seconds(seconds);
        }
        if let Some(filter) = &self.tag_filter {
            config = config.tag_filter(filter);
        }
        if self.skip_cleanup {
            config = config.skip_cleanup(true);
        }
        if let Some(host) = &self.sandbox_host {
            config = config.sandbox_program(host);
        }
        if !self.sandbox_args.is_empty() {
            config.sandbox.args = self.sandbox_args.clone();
        }
        if let Some(dir) = &self.runtime_dir {
            config = config.runtime_dir(dir);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Execute `request` and write the report. Returns the process exit code.
pub async fn run_tests(
    request: TestRequest,
    options: &RunOptions,
    report: Option<PathBuf>,
) -> Result<u8> {
    let config = options.to_config()?;
    let launcher = ProcessSandbox::new(
        ProcessSandboxOptions::new(config.sandbox.program.clone())
            .args(config.sandbox.args.clone())
            .teardown_grace(config.teardown_grace()),
    );
    let orchestrator = Orchestrator::new(config, Arc::new(launcher))?;
    let abort = orchestrator.abort_handle();
    let cleanup = orchestrator.cleanup_manager().clone();
    let keep_files = orchestrator.config().skip_cleanup;
    let mut signals = SignalHandler::new()?;

    let execution = orchestrator.execute(&request);
    tokio::pin!(execution);

    let result = loop {
        tokio::select! {
            result = &mut execution => break result?,
            Some(event) = signals.recv() => {
                if abort.abort() {
                    warn!("Received {}, aborting the test run", event);
                } else {
                    warn!("Received {} while shutting down, removing session files and exiting", event);
                    if !keep_files {
                        cleanup.cleanup();
                    }
                    return Ok(ExitCodes::ABORTED);
                }
            }
        }
    };

    if result.build_failed() {
        error!("No report written, the test package could not be built");
        return Ok(ExitCodes::for_verdict(result.verdict()));
    }

    if let Some(path) = report {
        if let Err(e) = ReportWriter::new().write_to(&result, &path) {
            error!(
                "Error while writing the results to file {}: {}",
                path.display(),
                e
            );
        }
    } else {
        info!("No report path given, results are not saved");
    }

    let verdict = result.verdict();
    info!("Verdict: {:?}", verdict);
    Ok(ExitCodes::for_verdict(verdict))
}
