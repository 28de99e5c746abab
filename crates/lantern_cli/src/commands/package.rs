//! Package command - Run the tests of an existing package.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use lantern_core::TestRequest;
use tracing::info;

use super::{run_tests, RunOptions};

#[derive(Args)]
pub struct PackageArgs {
    /// Test package to run
    package: PathBuf,

    /// Path of the XML report
    #[arg(value_name = "REPORT", conflicts_with = "report")]
    report_path: Option<PathBuf>,

    #[command(flatten)]
    options: RunOptions,
}

pub async fn execute(args: PackageArgs) -> Result<u8> {
    info!("Running tests from package {}", args.package.display());

    let report = args.options.report.clone().or(args.report_path);
    run_tests(TestRequest::from_package(args.package), &args.options, report).await
}
