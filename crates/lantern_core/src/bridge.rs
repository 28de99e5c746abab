//! Decoding of sandbox notifications into typed events.
//!
//! Decoding never fails: a payload that cannot be read turns into an
//! `ErrorOccurred` event describing the problem, and the run-level events
//! (`RunStarting`, `RunFinished`) are still delivered so the run can progress.

use lantern_runner::{Notification, NotificationKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{ComposedOutcome, ExceptionInfo, RunStartInfo, ScenarioResult, TestMethodIdentity};

/// Assembly payload of `AssemblyStarting`/`AssemblyFinished`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssemblyInfo {
    pub name: String,
}

/// Typed event republished from the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    RunStarting(RunStartInfo),
    AssemblyStarting(String),
    AssemblyFinished(String),
    MethodStarting(TestMethodIdentity),
    MethodFinished(ScenarioResult),
    LogMessage(String),
    /// `None` when the final outcome could not be read.
    RunFinished(Option<ComposedOutcome>),
    ErrorOccurred(ExceptionInfo),
    ReadyToStart,
}

impl BridgeEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::RunStarting(_) => NotificationKind::RunStarting,
            Self::AssemblyStarting(_) => NotificationKind::AssemblyStarting,
            Self::AssemblyFinished(_) => NotificationKind::AssemblyFinished,
            Self::MethodStarting(_) => NotificationKind::MethodStarting,
            Self::MethodFinished(_) => NotificationKind::MethodFinished,
            Self::LogMessage(_) => NotificationKind::LogMessage,
            Self::RunFinished(_) => NotificationKind::RunFinished,
            Self::ErrorOccurred(_) => NotificationKind::ErrorOccurred,
            Self::ReadyToStart => NotificationKind::ReadyToStart,
        }
    }
}

fn parse<T: DeserializeOwned>(notification: &Notification) -> Result<T, BridgeEvent> {
    serde_json::from_str(&notification.payload).map_err(|e| {
        warn!("Could not read {} payload: {}", notification.kind, e);
        BridgeEvent::ErrorOccurred(ExceptionInfo::new(format!(
            "Error while deserializing data for {}: {}",
            notification.kind, e
        )))
    })
}

/// Decode one notification into the events it stands for.
pub fn decode(notification: &Notification) -> Vec<BridgeEvent> {
    match notification.kind {
        NotificationKind::RunStarting => match parse::<RunStartInfo>(notification) {
            Ok(info) => vec![BridgeEvent::RunStarting(info)],
            Err(error) => vec![error, BridgeEvent::RunStarting(RunStartInfo::default())],
        },
        NotificationKind::AssemblyStarting => match parse::<AssemblyInfo>(notification) {
            Ok(assembly) => vec![BridgeEvent::AssemblyStarting(assembly.name)],
            Err(error) => vec![error],
        },
        NotificationKind::AssemblyFinished => match parse::<AssemblyInfo>(notification) {
            Ok(assembly) => vec![BridgeEvent::AssemblyFinished(assembly.name)],
            Err(error) => vec![error],
        },
        NotificationKind::MethodStarting => match parse::<TestMethodIdentity>(notification) {
            Ok(identity) => vec![BridgeEvent::MethodStarting(identity)],
            Err(error) => vec![error],
        },
        NotificationKind::MethodFinished => match parse::<ScenarioResult>(notification) {
            Ok(result) => vec![BridgeEvent::MethodFinished(result)],
            Err(error) => vec![error],
        },
        NotificationKind::LogMessage => vec![BridgeEvent::LogMessage(notification.payload.clone())],
        NotificationKind::RunFinished => match parse::<ComposedOutcome>(notification) {
            Ok(outcome) => vec![BridgeEvent::RunFinished(Some(outcome))],
            Err(error) => vec![error, BridgeEvent::RunFinished(None)],
        },
        NotificationKind::ErrorOccurred => {
            match serde_json::from_str::<ExceptionInfo>(&notification.payload) {
                Ok(exception) => vec![BridgeEvent::ErrorOccurred(exception)],
                // Unreadable errors are passed on as plain text.
                Err(_) => vec![BridgeEvent::ErrorOccurred(ExceptionInfo::new(
                    notification.payload.clone(),
                ))],
            }
        }
        NotificationKind::ReadyToStart => vec![BridgeEvent::ReadyToStart],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(kind: NotificationKind, payload: &str) -> Notification {
        Notification::new(kind, payload)
    }

    #[test]
    fn test_decode_well_formed_payloads() {
        assert_eq!(
            decode(&n(
                NotificationKind::RunStarting,
                r#"{"totalAssemblies":2,"totalMethods":17}"#
            )),
            vec![BridgeEvent::RunStarting(RunStartInfo {
                total_assemblies: 2,
                total_methods: 17
            })]
        );
        assert_eq!(
            decode(&n(NotificationKind::AssemblyFinished, r#"{"name":"Shop.Tests"}"#)),
            vec![BridgeEvent::AssemblyFinished("Shop.Tests".to_string())]
        );
        assert_eq!(
            decode(&n(
                NotificationKind::MethodStarting,
                r#"{"className":"CartTests","methodName":"AddsItem"}"#
            )),
            vec![BridgeEvent::MethodStarting(TestMethodIdentity::new(
                "CartTests", "AddsItem"
            ))]
        );
        assert_eq!(
            decode(&n(NotificationKind::LogMessage, "not json at all")),
            vec![BridgeEvent::LogMessage("not json at all".to_string())]
        );
        assert_eq!(
            decode(&n(NotificationKind::ReadyToStart, "")),
            vec![BridgeEvent::ReadyToStart]
        );
    }

    #[test]
    fn test_malformed_run_starting_still_starts() {
        let events = decode(&n(NotificationKind::RunStarting, "{broken"));
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], BridgeEvent::ErrorOccurred(e) if e.message.contains("RunStarting")));
        assert_eq!(events[1], BridgeEvent::RunStarting(RunStartInfo::default()));
    }

    #[test]
    fn test_malformed_run_finished_still_finishes() {
        let events = decode(&n(NotificationKind::RunFinished, "<xml/>"));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), NotificationKind::ErrorOccurred);
        assert_eq!(events[1], BridgeEvent::RunFinished(None));
    }

    #[test]
    fn test_malformed_method_finished_becomes_error() {
        let events = decode(&n(NotificationKind::MethodFinished, r#"{"outcome":"Passed"}"#));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), NotificationKind::ErrorOccurred);
    }

    #[test]
    fn test_error_payload_falls_back_to_raw_text() {
        assert_eq!(
            decode(&n(
                NotificationKind::ErrorOccurred,
                r#"{"message":"harness crashed","stackTrace":"at Harness.Run()"}"#
            )),
            vec![BridgeEvent::ErrorOccurred(
                ExceptionInfo::new("harness crashed").with_stack_trace("at Harness.Run()")
            )]
        );
        assert_eq!(
            decode(&n(NotificationKind::ErrorOccurred, "Out of memory")),
            vec![BridgeEvent::ErrorOccurred(ExceptionInfo::new("Out of memory"))]
        );
    }
}
