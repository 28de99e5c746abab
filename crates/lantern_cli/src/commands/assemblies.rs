//! Assemblies command - Build a package from test assemblies and run it.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use lantern_core::TestRequest;
use tracing::{debug, info};

use super::{run_tests, RunOptions};

#[derive(Args)]
pub struct AssembliesArgs {
    /// Test assemblies, comma separated; wildcards are expanded
    #[arg(long, required = true, value_delimiter = ',', value_name = "FILES")]
    tests: Vec<String>,

    /// Referenced files, comma separated; wildcards are expanded
    #[arg(long, value_delimiter = ',', value_name = "FILES")]
    references: Vec<String>,

    /// Path of the XML report
    #[arg(value_name = "REPORT", conflicts_with = "report")]
    report_path: Option<PathBuf>,

    #[command(flatten)]
    options: RunOptions,
}

pub async fn execute(args: AssembliesArgs) -> Result<u8> {
    let request =
        TestRequest::from_assembly_patterns(args.tests.as_slice(), args.references.as_slice())?;

    if let TestRequest::FromAssemblies {
        test_assembly_paths,
        referenced_file_paths,
    } = &request
    {
        info!(
            "Running {} test assemblies with {} referenced files",
            test_assembly_paths.len(),
            referenced_file_paths.len()
        );
        for path in test_assembly_paths.iter().chain(referenced_file_paths) {
            debug!("  {}", path.display());
        }
    }

    let report = args.options.report.clone().or(args.report_path);
    run_tests(request, &args.options, report).await
}
