//! # lantern_runner
//!
//! Sandbox hosting for lantern.
//!
//! This crate starts the sandboxed runtime that executes a test package and
//! carries the notifications emitted by the in-sandbox harness back to the
//! host process.
//!
//! # Features
//!
//! - **Launcher trait**: `launch(page) -> handle`, `send_settings`, `tear_down`
//! - **Process host**: newline-delimited JSON over the host program's stdio
//! - **Mock sandbox**: scripted notifications for tests without a sandbox
//!
//! # Example
//!
//! ```rust,no_run
//! use lantern_runner::{notification_channel, ProcessSandbox, ProcessSandboxOptions, SandboxLauncher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sandbox = ProcessSandbox::new(ProcessSandboxOptions::new("lantern-sandbox-host"));
//!     let (tx, mut rx) = notification_channel();
//!
//!     let handle = sandbox.launch("file:///tmp/run/lantern-host.html", tx).await?;
//!     while let Some(notification) = rx.recv().await {
//!         println!("{}: {}", notification.kind, notification.payload);
//!     }
//!     sandbox.tear_down(&handle).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mock;
pub mod notification;
pub mod process;
pub mod sandbox;

pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockSandbox, ScriptStep};
pub use notification::{
    notification_channel, Notification, NotificationKind, NotificationReceiver,
    NotificationSender,
};
pub use process::{ProcessSandbox, ProcessSandboxOptions, DEFAULT_HOST_PROGRAM};
pub use sandbox::{SandboxHandle, SandboxLauncher};
