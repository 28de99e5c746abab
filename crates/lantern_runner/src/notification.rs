//! Raw notifications pushed out of the sandbox.
//!
//! A notification is a kind tag plus an opaque serialized payload. Decoding
//! payloads into typed events is the orchestrator's job; this layer only moves
//! them from the sandbox host to the host process.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Kinds of notification the in-sandbox harness emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    RunStarting,
    AssemblyStarting,
    AssemblyFinished,
    MethodStarting,
    MethodFinished,
    LogMessage,
    RunFinished,
    ErrorOccurred,
    ReadyToStart,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RunStarting => "RunStarting",
            Self::AssemblyStarting => "AssemblyStarting",
            Self::AssemblyFinished => "AssemblyFinished",
            Self::MethodStarting => "MethodStarting",
            Self::MethodFinished => "MethodFinished",
            Self::LogMessage => "LogMessage",
            Self::RunFinished => "RunFinished",
            Self::ErrorOccurred => "ErrorOccurred",
            Self::ReadyToStart => "ReadyToStart",
        };
        write!(f, "{}", name)
    }
}

/// One notification from the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    #[serde(default)]
    pub payload: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Parse one newline-delimited envelope line.
    ///
    /// A line that is not a valid envelope becomes an `ErrorOccurred`
    /// notification carrying the raw line.
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str::<Notification>(line) {
            Ok(notification) => notification,
            Err(e) => {
                warn!("Unreadable notification from sandbox ({}): {}", e, line);
                Self::new(NotificationKind::ErrorOccurred, line)
            }
        }
    }

    /// Serialize as a single envelope line, without the trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Sending half of the notification channel handed to a sandbox at launch.
pub type NotificationSender = mpsc::UnboundedSender<Notification>;

/// Receiving half consumed by the orchestrator's dispatcher.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Create a notification channel.
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_line() {
        let n = Notification::from_line(r#"{"kind":"LogMessage","payload":"hello"}"#);
        assert_eq!(n, Notification::new(NotificationKind::LogMessage, "hello"));

        let ready = Notification::from_line(r#"{"kind":"ReadyToStart"}"#);
        assert_eq!(ready.kind, NotificationKind::ReadyToStart);
        assert!(ready.payload.is_empty());
    }

    #[test]
    fn test_garbage_line_becomes_error() {
        let n = Notification::from_line("Segmentation fault");
        assert_eq!(n.kind, NotificationKind::ErrorOccurred);
        assert_eq!(n.payload, "Segmentation fault");

        let unknown = Notification::from_line(r#"{"kind":"Teleport","payload":""}"#);
        assert_eq!(unknown.kind, NotificationKind::ErrorOccurred);
    }

    #[test]
    fn test_to_line_is_readable_back() {
        let n = Notification::new(NotificationKind::RunStarting, r#"{"totalAssemblies":1}"#);
        let line = n.to_line().unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(Notification::from_line(&line), n);
    }
}
