//! Test run data model.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use lantern_package::{resolve_paths, PackageBuildResult};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Identity of a single test method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestMethodIdentity {
    /// Short class name
    pub class_name: String,
    /// Fully qualified type name
    pub type_name: String,
    pub namespace_name: String,
    pub assembly_name: String,
    pub method_name: String,
    /// Name shown in reports, when the harness provides one
    pub display_name: String,
}

impl TestMethodIdentity {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            ..Default::default()
        }
    }

    pub fn in_assembly(mut self, assembly_name: impl Into<String>) -> Self {
        self.assembly_name = assembly_name.into();
        self
    }

    pub fn in_namespace(mut self, namespace_name: impl Into<String>) -> Self {
        self.namespace_name = namespace_name.into();
        self
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Display name, falling back to the method name.
    pub fn report_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.method_name
        } else {
            &self.display_name
        }
    }

    /// Fixture name: the full type name, or the class name when unknown.
    pub fn fixture_name(&self) -> &str {
        if self.type_name.is_empty() {
            &self.class_name
        } else {
            &self.type_name
        }
    }

    /// Whether both identities denote the same method of the same class.
    pub fn same_method(&self, other: &TestMethodIdentity) -> bool {
        self.class_name == other.class_name && self.method_name == other.method_name
    }
}

impl std::fmt::Display for TestMethodIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)
    }
}

/// Outcome of a single test as reported by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Error,
    Failed,
    Timeout,
    Aborted,
    Inconclusive,
    PassedButRunAborted,
    NotRunnable,
    NotExecuted,
    Disconnected,
    Warning,
    Passed,
    Completed,
    InProgress,
    Pending,
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Failed => "Failed",
            Self::Timeout => "Timeout",
            Self::Aborted => "Aborted",
            Self::Inconclusive => "Inconclusive",
            Self::PassedButRunAborted => "PassedButRunAborted",
            Self::NotRunnable => "NotRunnable",
            Self::NotExecuted => "NotExecuted",
            Self::Disconnected => "Disconnected",
            Self::Warning => "Warning",
            Self::Passed => "Passed",
            Self::Completed => "Completed",
            Self::InProgress => "InProgress",
            Self::Pending => "Pending",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exception details attached to a failed test or a harness error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExceptionInfo {
    pub message: String,
    pub stack_trace: Option<String>,
}

impl ExceptionInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }
}

impl std::fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {}",
            self.message,
            self.stack_trace.as_deref().unwrap_or_default()
        )
    }
}

/// Result of one executed test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub identity: TestMethodIdentity,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: Outcome,
    #[serde(default)]
    pub exception: Option<ExceptionInfo>,
}

impl ScenarioResult {
    /// Duration in seconds, never negative.
    pub fn duration_seconds(&self) -> f64 {
        let millis = (self.finished_at - self.started_at).num_milliseconds();
        millis.max(0) as f64 / 1000.0
    }
}

/// Accumulated results of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComposedOutcome {
    pub results: Vec<ScenarioResult>,
    pub errors: Vec<String>,
}

impl ComposedOutcome {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }
}

/// Totals announced by the harness when the run starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunStartInfo {
    pub total_assemblies: u32,
    pub total_methods: u32,
}

/// Default idle timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Settings pushed into the sandbox once it is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSettings {
    pub package_uri: String,
    pub test_assembly_file_names: BTreeSet<String>,
    pub tag_filter: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            package_uri: String::new(),
            test_assembly_file_names: BTreeSet::new(),
            tag_filter: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl RunSettings {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// What to test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestRequest {
    /// Re-package and run an existing package.
    FromPackage { source_package_path: PathBuf },
    /// Build a package from loose assemblies.
    FromAssemblies {
        test_assembly_paths: Vec<PathBuf>,
        referenced_file_paths: Vec<PathBuf>,
    },
}

impl TestRequest {
    pub fn from_package(path: impl Into<PathBuf>) -> Self {
        Self::FromPackage {
            source_package_path: path.into(),
        }
    }

    /// Build an assemblies request, expanding wildcards in both lists.
    pub fn from_assembly_patterns<S: AsRef<str>>(tests: &[S], references: &[S]) -> CoreResult<Self> {
        Ok(Self::FromAssemblies {
            test_assembly_paths: resolve_paths(tests)?,
            referenced_file_paths: resolve_paths(references)?,
        })
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Building,
    Running,
    Finished,
    TimedOut,
    Aborted,
}

impl Default for RunState {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::TimedOut | Self::Aborted)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::Building => "building",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::TimedOut => "timed out",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// Final verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    NoTestsExecuted,
    TestsFailed,
    Aborted,
    TimedOut,
    BuildFailed,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Everything known about a run once it has concluded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub run_state: RunState,
    pub composed_outcome: ComposedOutcome,
    pub methods_started_but_not_finished: Vec<TestMethodIdentity>,
    pub execution_errors: Vec<String>,
    pub package_build_result: Option<PackageBuildResult>,
    pub run_start_info: Option<RunStartInfo>,
    /// Whether the harness reported the end of the run
    pub run_was_complete: bool,
}

impl ExecutionResult {
    pub fn build_failed(&self) -> bool {
        self.package_build_result
            .as_ref()
            .map(|b| !b.success)
            .unwrap_or(false)
    }

    pub fn verdict(&self) -> Verdict {
        if self.build_failed() {
            return Verdict::BuildFailed;
        }
        if self.composed_outcome.results.is_empty() {
            return Verdict::NoTestsExecuted;
        }
        match self.run_state {
            RunState::Aborted => Verdict::Aborted,
            RunState::TimedOut => Verdict::TimedOut,
            _ if self.composed_outcome.failed_count() > 0 => Verdict::TestsFailed,
            _ => Verdict::Passed,
        }
    }

    /// Name identifying the tested package in reports.
    pub fn package_name(&self) -> String {
        self.package_build_result
            .as_ref()
            .map(PackageBuildResult::display_name)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result(class: &str, method: &str, outcome: Outcome) -> ScenarioResult {
        let started_at = Utc::now();
        ScenarioResult {
            identity: TestMethodIdentity::new(class, method),
            started_at,
            finished_at: started_at + Duration::milliseconds(250),
            outcome,
            exception: None,
        }
    }

    fn finished_with(results: Vec<ScenarioResult>, state: RunState) -> ExecutionResult {
        ExecutionResult {
            run_state: state,
            composed_outcome: ComposedOutcome {
                results,
                errors: Vec::new(),
            },
            package_build_result: Some(PackageBuildResult {
                success: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_result_deserializes_camel_case() {
        let json = r#"{
            "identity": {"className": "CartTests", "methodName": "AddsItem", "assemblyName": "Shop.Tests"},
            "startedAt": "2024-03-01T10:00:00Z",
            "finishedAt": "2024-03-01T10:00:01.500Z",
            "outcome": "Failed",
            "exception": {"message": "boom"}
        }"#;

        let result: ScenarioResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.identity.to_string(), "CartTests.AddsItem");
        assert_eq!(result.identity.report_name(), "AddsItem");
        assert_eq!(result.identity.fixture_name(), "CartTests");
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(result.exception.unwrap().stack_trace, None);
        assert_eq!(
            serde_json::from_str::<ScenarioResult>(json).unwrap().duration_seconds(),
            1.5
        );
    }

    #[test]
    fn test_duration_is_never_negative() {
        let mut r = result("A", "B", Outcome::Passed);
        r.finished_at = r.started_at - Duration::seconds(3);
        assert_eq!(r.duration_seconds(), 0.0);
    }

    #[test]
    fn test_same_method_ignores_other_fields() {
        let a = TestMethodIdentity::new("CartTests", "AddsItem").in_assembly("One");
        let b = TestMethodIdentity::new("CartTests", "AddsItem").in_assembly("Two");
        let c = TestMethodIdentity::new("CartTests", "RemovesItem");
        assert!(a.same_method(&b));
        assert!(!a.same_method(&c));
    }

    #[test]
    fn test_verdict_precedence() {
        let failing = vec![
            result("A", "one", Outcome::Passed),
            result("A", "two", Outcome::Failed),
        ];

        assert_eq!(finished_with(vec![], RunState::Finished).verdict(), Verdict::NoTestsExecuted);
        assert_eq!(finished_with(vec![], RunState::Aborted).verdict(), Verdict::NoTestsExecuted);
        assert_eq!(
            finished_with(failing.clone(), RunState::Aborted).verdict(),
            Verdict::Aborted
        );
        assert_eq!(
            finished_with(failing.clone(), RunState::TimedOut).verdict(),
            Verdict::TimedOut
        );
        assert_eq!(
            finished_with(failing, RunState::Finished).verdict(),
            Verdict::TestsFailed
        );
        assert_eq!(
            finished_with(vec![result("A", "one", Outcome::Passed)], RunState::Finished).verdict(),
            Verdict::Passed
        );
    }

    #[test]
    fn test_build_failure_verdict() {
        let result = ExecutionResult {
            run_state: RunState::Finished,
            package_build_result: Some(PackageBuildResult::default()),
            ..Default::default()
        };
        assert_eq!(result.verdict(), Verdict::BuildFailed);
        assert!(!result.verdict().is_success());
    }

    #[test]
    fn test_run_settings_json() {
        let mut settings = RunSettings {
            package_uri: "file:///tmp/run/package.zip".to_string(),
            tag_filter: Some("Smoke".to_string()),
            ..Default::default()
        };
        settings.test_assembly_file_names.insert("Shop.Tests.dll".to_string());

        let json: serde_json::Value = serde_json::from_str(&settings.to_json().unwrap()).unwrap();
        assert_eq!(json["packageUri"], "file:///tmp/run/package.zip");
        assert_eq!(json["testAssemblyFileNames"][0], "Shop.Tests.dll");
        assert_eq!(json["tagFilter"], "Smoke");
        assert_eq!(json["timeoutSeconds"], 60);
    }
}
