//! End-to-end tests of the `lantern` binary for runs that never reach a sandbox.

use std::path::Path;
use std::process::{Command, Output};

fn lantern(args: &[&str], work_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lantern"))
        .args(args)
        .env("LANTERN_WORK_DIR", work_dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_no_arguments_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let output = lantern(&[], dir.path());

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"));
}

#[test]
fn test_invalid_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let output = lantern(&["package", "a.xap", "--timeout", "-5"], dir.path());

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_wildcard_in_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = dir.path().join("missing").join("*.dll");
    let output = lantern(
        &["assemblies", "--tests", pattern.to_str().unwrap()],
        dir.path(),
    );

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_no_test_files_is_a_build_failure() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let pattern = bin.join("*.Tests.dll");
    let report = dir.path().join("results.xml");

    let output = lantern(
        &[
            "assemblies",
            "--tests",
            pattern.to_str().unwrap(),
            report.to_str().unwrap(),
        ],
        &dir.path().join("work"),
    );

    assert_eq!(output.status.code(), Some(6));
    assert!(!report.exists());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No test assemblies were supplied"));
}

#[test]
fn test_missing_package_is_a_build_failure() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("results.xml");
    let log = dir.path().join("logs").join("lantern.log");

    let output = lantern(
        &[
            "package",
            dir.path().join("Shop.Tests.xap").to_str().unwrap(),
            "--report",
            report.to_str().unwrap(),
            "--log-file",
            log.to_str().unwrap(),
        ],
        &dir.path().join("work"),
    );

    assert_eq!(output.status.code(), Some(6));
    assert!(!report.exists());
    let logged = std::fs::read_to_string(&log).unwrap();
    assert!(logged.contains("does not exist"));
    assert!(!logged.contains("\u{1b}["));
}
