//! XML results report.
//!
//! The report nests `test-suite` elements assembly → namespace → fixture, each
//! wrapping a `results` element, with one `test-case` per executed test. Groups
//! appear in the order their first result arrived.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::model::{ExecutionResult, Outcome, ScenarioResult};

/// Frames from test framework internals that are dropped from stack traces.
const STACK_FRAME_DENYLIST: [&str; 8] = [
    "NUnit.Core.TestCase",
    "NUnit.Core.ExpectedExceptionTestCase",
    "NUnit.Core.TemplateTestCase",
    "NUnit.Core.TestResult",
    "NUnit.Core.TestSuite",
    "NUnit.Framework.Assertion",
    "NUnit.Framework.Assert",
    "System.Reflection.MonoMethod",
];

/// Host details recorded in the `environment` and `culture-info` elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEnvironment {
    pub os_version: String,
    pub platform: String,
    pub cwd: String,
    pub machine_name: String,
    pub user: String,
    pub culture: String,
}

impl ReportEnvironment {
    /// Collect the details of the current host.
    pub fn detect() -> Self {
        let var = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| std::env::var(n).ok().filter(|v| !v.is_empty()))
                .unwrap_or_default()
        };

        let culture = var(&["LC_ALL", "LANG"])
            .split('.')
            .next()
            .map(|c| c.replace('_', "-"))
            .filter(|c| !c.is_empty() && c != "C" && c != "POSIX")
            .unwrap_or_else(|| "en-US".to_string());

        Self {
            os_version: std::env::consts::OS.to_string(),
            platform: std::env::consts::ARCH.to_string(),
            cwd: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            machine_name: var(&["HOSTNAME", "COMPUTERNAME"]),
            user: var(&["USER", "USERNAME"]),
            culture,
        }
    }
}

/// Serializes execution results into the XML report format.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    generated_at: DateTime<Local>,
    environment: ReportEnvironment,
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportWriter {
    pub fn new() -> Self {
        Self {
            generated_at: Local::now(),
            environment: ReportEnvironment::detect(),
        }
    }

    pub fn with_timestamp(mut self, generated_at: DateTime<Local>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn with_environment(mut self, environment: ReportEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Render the report.
    pub fn write_report(&self, result: &ExecutionResult) -> CoreResult<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        self.write_document(&mut writer, result)?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| CoreError::Report(e.to_string()))
    }

    /// Render the report and write it to `path`, replacing an existing file.
    pub fn write_to(&self, result: &ExecutionResult, path: &Path) -> CoreResult<()> {
        let report = self.write_report(result)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, report)?;
        info!("Testing results saved to file: {}", path.display());
        Ok(())
    }

    fn write_document(
        &self,
        writer: &mut Writer<Cursor<Vec<u8>>>,
        result: &ExecutionResult,
    ) -> CoreResult<()> {
        let results = &result.composed_outcome.results;
        let count = |outcome: Outcome| results.iter().filter(|r| r.outcome == outcome).count();

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("no"))))?;
        writer.write_event(Event::Comment(BytesText::new(
            "This file represents the results of running a test suite",
        )))?;

        let package_name = safe_text(&result.package_name());
        let total = results.len().to_string();
        let errors = count(Outcome::Error).to_string();
        let failures = count(Outcome::Failed).to_string();
        let not_run = count(Outcome::NotExecuted).to_string();
        let inconclusive = count(Outcome::Inconclusive).to_string();
        let date = self.generated_at.format("%Y-%m-%d").to_string();
        let time = self.generated_at.format("%H:%M:%S").to_string();

        let mut root = BytesStart::new("test-results");
        root.push_attribute(("name", package_name.as_str()));
        root.push_attribute(("total", total.as_str()));
        root.push_attribute(("errors", errors.as_str()));
        root.push_attribute(("failures", failures.as_str()));
        root.push_attribute(("not-run", not_run.as_str()));
        root.push_attribute(("inconclusive", inconclusive.as_str()));
        root.push_attribute(("ignored", "0"));
        root.push_attribute(("skipped", "0"));
        root.push_attribute(("invalid", "0"));
        root.push_attribute(("date", date.as_str()));
        root.push_attribute(("time", time.as_str()));
        writer.write_event(Event::Start(root))?;

        self.write_environment(writer)?;

        if results.is_empty() {
            write_suite_start(writer, "Assembly", &package_name, &[])?;
            writer.write_event(Event::Start(BytesStart::new("results")))?;
            writer.write_event(Event::End(BytesEnd::new("results")))?;
            writer.write_event(Event::End(BytesEnd::new("test-suite")))?;
        }

        for (assembly, namespaces) in group(results) {
            let assembly_results: Vec<&ScenarioResult> =
                namespaces.values().flat_map(|f| f.values().flatten().copied()).collect();
            write_suite_start(writer, "Assembly", &assembly, &assembly_results)?;
            writer.write_event(Event::Start(BytesStart::new("results")))?;

            for (namespace, fixtures) in &namespaces {
                let namespace_results: Vec<&ScenarioResult> =
                    fixtures.values().flatten().copied().collect();
                write_suite_start(writer, "Namespace", namespace, &namespace_results)?;
                writer.write_event(Event::Start(BytesStart::new("results")))?;

                for (fixture, cases) in fixtures {
                    write_suite_start(writer, "TestFixture", fixture, cases)?;
                    writer.write_event(Event::Start(BytesStart::new("results")))?;
                    for case in cases {
                        write_case(writer, case)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("results")))?;
                    writer.write_event(Event::End(BytesEnd::new("test-suite")))?;
                }

                writer.write_event(Event::End(BytesEnd::new("results")))?;
                writer.write_event(Event::End(BytesEnd::new("test-suite")))?;
            }

            writer.write_event(Event::End(BytesEnd::new("results")))?;
            writer.write_event(Event::End(BytesEnd::new("test-suite")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("test-results")))?;
        Ok(())
    }

    fn write_environment(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> CoreResult<()> {
        let env = &self.environment;
        let lantern_version = format!("lantern {}", env!("CARGO_PKG_VERSION"));

        let mut environment = BytesStart::new("environment");
        environment.push_attribute(("nunit-version", "2.5.9"));
        environment.push_attribute(("clr-version", lantern_version.as_str()));
        environment.push_attribute(("os-version", safe_text(&env.os_version).as_str()));
        environment.push_attribute(("platform", safe_text(&env.platform).as_str()));
        environment.push_attribute(("cwd", safe_text(&env.cwd).as_str()));
        environment.push_attribute(("machine-name", safe_text(&env.machine_name).as_str()));
        environment.push_attribute(("user", safe_text(&env.user).as_str()));
        environment.push_attribute(("user-domain", safe_text(&env.machine_name).as_str()));
        writer.write_event(Event::Empty(environment))?;

        let mut culture = BytesStart::new("culture-info");
        culture.push_attribute(("current-culture", safe_text(&env.culture).as_str()));
        culture.push_attribute(("current-uiculture", safe_text(&env.culture).as_str()));
        writer.write_event(Event::Empty(culture))?;
        Ok(())
    }
}

type Fixtures<'a> = IndexMap<String, Vec<&'a ScenarioResult>>;
type Namespaces<'a> = IndexMap<String, Fixtures<'a>>;

fn group(results: &[ScenarioResult]) -> IndexMap<String, Namespaces<'_>> {
    let mut assemblies: IndexMap<String, Namespaces<'_>> = IndexMap::new();
    for result in results {
        let identity = &result.identity;
        assemblies
            .entry(identity.assembly_name.clone())
            .or_default()
            .entry(identity.namespace_name.clone())
            .or_default()
            .entry(identity.fixture_name().to_string())
            .or_default()
            .push(result);
    }
    assemblies
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn write_suite_start(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    suite_type: &str,
    name: &str,
    results: &[&ScenarioResult],
) -> CoreResult<()> {
    let executed = !results.is_empty();
    let success = results.iter().all(|r| r.outcome.is_passed());
    let time = format!(
        "{:.3}",
        results.iter().map(|r| r.duration_seconds()).sum::<f64>()
    );
    let name = safe_text(name);

    let mut suite = BytesStart::new("test-suite");
    suite.push_attribute(("type", suite_type));
    suite.push_attribute(("name", name.as_str()));
    suite.push_attribute(("executed", bool_text(executed)));
    suite.push_attribute(("result", if success { "Success" } else { "Failure" }));
    if executed {
        suite.push_attribute(("success", bool_text(success)));
        suite.push_attribute(("time", time.as_str()));
        suite.push_attribute(("asserts", "0"));
    }
    writer.write_event(Event::Start(suite))?;
    Ok(())
}

fn case_result_text(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Passed => "Success",
        Outcome::Failed => "Failure",
        Outcome::Inconclusive => "Inconclusive",
        Outcome::NotExecuted => "NotRunnable",
        _ => "Error",
    }
}

fn write_case(writer: &mut Writer<Cursor<Vec<u8>>>, result: &ScenarioResult) -> CoreResult<()> {
    let passed = result.outcome.is_passed();
    let name = safe_text(result.identity.report_name());
    let time = format!("{:.3}", result.duration_seconds());

    let mut case = BytesStart::new("test-case");
    case.push_attribute(("name", name.as_str()));
    case.push_attribute((
        "executed",
        bool_text(result.outcome != Outcome::NotExecuted),
    ));
    case.push_attribute(("result", case_result_text(result.outcome)));
    case.push_attribute(("success", bool_text(passed)));
    case.push_attribute(("time", time.as_str()));
    case.push_attribute(("asserts", "0"));

    if passed {
        writer.write_event(Event::Empty(case))?;
        return Ok(());
    }

    writer.write_event(Event::Start(case))?;

    let exception = result.exception.as_ref();
    let message = exception
        .map(|e| e.message.as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or("Unknown");
    let stack_trace = exception
        .and_then(|e| e.stack_trace.as_deref())
        .map(filter_stack_trace)
        .unwrap_or_else(|| "Unknown".to_string());

    writer.write_event(Event::Start(BytesStart::new("failure")))?;
    writer.write_event(Event::Start(BytesStart::new("message")))?;
    write_cdata(writer, message)?;
    writer.write_event(Event::End(BytesEnd::new("message")))?;
    writer.write_event(Event::Start(BytesStart::new("stack-trace")))?;
    write_cdata(writer, &stack_trace)?;
    writer.write_event(Event::End(BytesEnd::new("stack-trace")))?;
    writer.write_event(Event::End(BytesEnd::new("failure")))?;

    writer.write_event(Event::End(BytesEnd::new("test-case")))?;
    Ok(())
}

/// Write `text` as CDATA, splitting it wherever it contains `]]>`.
fn write_cdata(writer: &mut Writer<Cursor<Vec<u8>>>, text: &str) -> CoreResult<()> {
    for section in cdata_sections(&safe_text(text)) {
        writer.write_event(Event::CData(BytesCData::new(section)))?;
    }
    Ok(())
}

fn cdata_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    while let Some(found) = text[start..].find("]]>") {
        let split = start + found + 2;
        sections.push(&text[start..split]);
        start = split;
    }
    if start < text.len() || sections.is_empty() {
        sections.push(&text[start..]);
    }
    sections
}

/// Replace control characters other than tab, CR and LF with `?`.
pub fn safe_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') {
                '?'
            } else {
                c
            }
        })
        .collect()
}

/// Drop test framework frames from a stack trace and trim every kept line.
pub fn filter_stack_trace(stack: &str) -> String {
    let mut filtered = String::new();
    for line in stack.lines() {
        let framework_frame = STACK_FRAME_DENYLIST
            .iter()
            .any(|p| matches!(line.find(p), Some(i) if i > 0));
        if !framework_frame {
            filtered.push_str(line.trim());
            filtered.push('\n');
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComposedOutcome, ExceptionInfo, RunState, TestMethodIdentity};
    use chrono::{Duration, TimeZone, Utc};
    use lantern_package::PackageBuildResult;
    use std::path::PathBuf;

    fn writer() -> ReportWriter {
        ReportWriter::new()
            .with_timestamp(Local.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap())
            .with_environment(ReportEnvironment {
                os_version: "linux".to_string(),
                platform: "x86_64".to_string(),
                cwd: "/work".to_string(),
                machine_name: "ci-01".to_string(),
                user: "builder".to_string(),
                culture: "en-US".to_string(),
            })
    }

    fn case(
        assembly: &str,
        class: &str,
        method: &str,
        millis: i64,
        outcome: Outcome,
    ) -> ScenarioResult {
        let started_at = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
        ScenarioResult {
            identity: TestMethodIdentity::new(class, method)
                .in_assembly(assembly)
                .in_namespace("Shop")
                .with_type_name(format!("Shop.{}", class)),
            started_at,
            finished_at: started_at + Duration::milliseconds(millis),
            outcome,
            exception: None,
        }
    }

    fn execution(results: Vec<ScenarioResult>) -> ExecutionResult {
        ExecutionResult {
            run_state: RunState::Finished,
            composed_outcome: ComposedOutcome {
                results,
                errors: Vec::new(),
            },
            package_build_result: Some(PackageBuildResult {
                success: true,
                resulting_package_path: PathBuf::from("/tmp/run/lantern-test-run.zip"),
                ..Default::default()
            }),
            run_was_complete: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_report_with_one_failure() {
        let mut failed = case("A", "CartTests", "RemovesItem", 1250, Outcome::Failed);
        failed.exception = Some(
            ExceptionInfo::new("Expected 1 but was 2")
                .with_stack_trace("  at Shop.CartTests.RemovesItem()\n  at NUnit.Framework.Assert.AreEqual()"),
        );
        let result = execution(vec![
            case("A", "CartTests", "AddsItem", 500, Outcome::Passed),
            failed,
        ]);

        let xml = writer().write_report(&result).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>"));
        assert!(xml.contains("<!--This file represents the results of running a test suite-->"));
        assert!(xml.contains(
            r#"<test-results name="/tmp/run/lantern-test-run.zip" total="2" errors="0" failures="1" not-run="0" inconclusive="0" ignored="0" skipped="0" invalid="0" date="2024-03-01" time="14:05:09">"#
        ));
        assert!(xml.contains(r#"nunit-version="2.5.9""#));
        assert!(xml.contains(r#"machine-name="ci-01""#));
        assert!(xml.contains(r#"<culture-info current-culture="en-US" current-uiculture="en-US"/>"#));
        assert!(xml.contains(
            r#"<test-suite type="Assembly" name="A" executed="True" result="Failure" success="False" time="1.750" asserts="0">"#
        ));
        assert!(xml.contains(r#"<test-suite type="Namespace" name="Shop" executed="True" result="Failure""#));
        assert!(xml.contains(r#"<test-suite type="TestFixture" name="Shop.CartTests" executed="True""#));
        assert!(xml.contains(
            r#"<test-case name="AddsItem" executed="True" result="Success" success="True" time="0.500" asserts="0"/>"#
        ));
        assert!(xml.contains(
            r#"<test-case name="RemovesItem" executed="True" result="Failure" success="False" time="1.250" asserts="0">"#
        ));
        assert!(xml.contains("<message><![CDATA[Expected 1 but was 2]]></message>"));
        assert!(xml.contains("<stack-trace><![CDATA[at Shop.CartTests.RemovesItem()\n]]></stack-trace>"));
        assert!(xml.trim_end().ends_with("</test-results>"));
    }

    #[test]
    fn test_suites_follow_first_appearance() {
        let result = execution(vec![
            case("Zeta.Tests", "Second", "one", 10, Outcome::Passed),
            case("Alpha.Tests", "First", "one", 10, Outcome::Passed),
            case("Zeta.Tests", "Second", "two", 10, Outcome::Passed),
        ]);

        let xml = writer().write_report(&result).unwrap();

        let zeta = xml.find(r#"name="Zeta.Tests""#).unwrap();
        let alpha = xml.find(r#"name="Alpha.Tests""#).unwrap();
        assert!(zeta < alpha);
        assert_eq!(xml.matches(r#"type="Assembly""#).count(), 2);
        assert_eq!(xml.matches(r#"name="Shop.Second""#).count(), 1);
        assert!(xml.contains(
            r#"<test-suite type="Assembly" name="Zeta.Tests" executed="True" result="Success" success="True" time="0.020" asserts="0">"#
        ));
    }

    #[test]
    fn test_report_without_results() {
        let xml = writer().write_report(&execution(Vec::new())).unwrap();

        assert!(xml.contains(r#"total="0" errors="0" failures="0""#));
        assert!(xml.contains(
            r#"<test-suite type="Assembly" name="/tmp/run/lantern-test-run.zip" executed="False" result="Success">"#
        ));
        assert!(!xml.contains("test-case"));
        assert!(!xml.contains("success="));
    }

    #[test]
    fn test_failure_without_exception_is_unknown() {
        let mut not_run = case("A", "CartTests", "Skipped", 0, Outcome::NotExecuted);
        not_run.identity = not_run.identity.with_display_name("Skipped <slow>");
        let xml = writer()
            .write_report(&execution(vec![
                not_run,
                case("A", "CartTests", "Crashes", 0, Outcome::Error),
            ]))
            .unwrap();

        assert!(xml.contains(r#"errors="1" failures="0" not-run="1""#));
        assert!(xml.contains(r#"<test-case name="Skipped &lt;slow&gt;" executed="False" result="NotRunnable""#));
        assert!(xml.contains(r#"<test-case name="Crashes" executed="True" result="Error""#));
        assert_eq!(xml.matches("<message><![CDATA[Unknown]]></message>").count(), 2);
    }

    #[test]
    fn test_message_with_cdata_terminator() {
        let mut failed = case("A", "ParserTests", "Reads", 0, Outcome::Failed);
        failed.exception = Some(ExceptionInfo::new("got ]]> in\u{7}put"));
        let xml = writer().write_report(&execution(vec![failed])).unwrap();

        assert!(xml.contains("<message><![CDATA[got ]]]]><![CDATA[> in?put]]></message>"));
    }

    #[test]
    fn test_write_to_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("results.xml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale").unwrap();

        writer()
            .write_to(&execution(vec![case("A", "CartTests", "AddsItem", 5, Outcome::Passed)]), &path)
            .unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains(r#"total="1""#));
        assert!(!written.contains("stale"));
    }

    #[test]
    fn test_cdata_sections_split_terminator() {
        assert_eq!(cdata_sections("plain"), vec!["plain"]);
        assert_eq!(cdata_sections(""), vec![""]);
        assert_eq!(cdata_sections("a]]>b"), vec!["a]]", ">b"]);
        assert_eq!(cdata_sections("x]]>"), vec!["x]]", ">"]);
        assert_eq!(cdata_sections("]]>]]>"), vec!["]]", ">]]", ">"]);
        for sections in [cdata_sections("a]]>b]]>c"), cdata_sections("]]>]]>")] {
            assert!(sections.iter().all(|s| !s.contains("]]>")));
        }
        assert_eq!(cdata_sections("a]]>b]]>c").concat(), "a]]>b]]>c");
    }

    #[test]
    fn test_safe_text_replaces_control_characters() {
        assert_eq!(safe_text("a\u{1}b\tc\r\nd\u{1f}"), "a?b\tc\r\nd?");
    }

    #[test]
    fn test_filter_stack_trace() {
        let stack = "   at Shop.CartTests.AddsItem() in CartTests.cs:line 12\n   at NUnit.Framework.Assert.AreEqual(Object a, Object b)\nNUnit.Framework.Assert at line start is kept\n  at System.Reflection.MonoMethod.Invoke()\n";
        assert_eq!(
            filter_stack_trace(stack),
            "at Shop.CartTests.AddsItem() in CartTests.cs:line 12\nNUnit.Framework.Assert at line start is kept\n"
        );
    }
}
