//! lantern CLI - Main entry point.
//!
//! Exit codes:
//! - 0: All tests passed
//! - 1: Failing tests
//! - 2: Invalid arguments
//! - 3: No tests executed
//! - 4: Timed out
//! - 5: Aborted
//! - 6: Build or execution error

use std::fs::{self, File};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use lantern_core::{CoreError, Verdict};
use lantern_package::PackageError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod signal;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const TESTS_FAILED: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const NO_TESTS: u8 = 3;
    pub const TIMED_OUT: u8 = 4;
    pub const ABORTED: u8 = 5;
    pub const EXECUTION_ERROR: u8 = 6;

    pub fn for_verdict(verdict: Verdict) -> u8 {
        match verdict {
            Verdict::Passed => Self::SUCCESS,
            Verdict::TestsFailed => Self::TESTS_FAILED,
            Verdict::NoTestsExecuted => Self::NO_TESTS,
            Verdict::TimedOut => Self::TIMED_OUT,
            Verdict::Aborted => Self::ABORTED,
            Verdict::BuildFailed => Self::EXECUTION_ERROR,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Error: could not open log file: {:#}", e);
        return ExitCode::from(ExitCodes::INVALID_ARGS);
    }

    let result = match cli.command {
        Commands::Package(args) => commands::package::execute(args).await,
        Commands::Assemblies(args) => commands::assemblies::execute(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let exit_code = categorize_error(&e);
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Console output plus an optional plain-text copy in `log_file`.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,lantern={}", level)));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
    Ok(())
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<PackageError>().is_some() {
        return ExitCodes::INVALID_ARGS;
    }
    match e.downcast_ref::<CoreError>() {
        Some(CoreError::InvalidConfig(_) | CoreError::Toml(_) | CoreError::Package(_)) => {
            ExitCodes::INVALID_ARGS
        }
        _ => ExitCodes::EXECUTION_ERROR,
    }
}
