//! Signals that abort a running test run.

use std::fmt;

/// A signal asking lantern to shut down.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownEvent {
    #[cfg(unix)]
    Hangup,
    #[cfg(unix)]
    Term,
    Interrupt,
}

impl fmt::Display for ShutdownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Self::Hangup => write!(f, "SIGHUP"),
            #[cfg(unix)]
            Self::Term => write!(f, "SIGTERM"),
            Self::Interrupt => write!(f, "interrupt"),
        }
    }
}

/// Listens for shutdown signals for the duration of a run.
#[derive(Debug)]
pub struct SignalHandler {
    signals: imp::Signals,
}

impl SignalHandler {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            signals: imp::Signals::new()?,
        })
    }

    /// Wait for the next signal. Returns `None` once no signal can arrive.
    pub async fn recv(&mut self) -> Option<ShutdownEvent> {
        self.signals.recv().await
    }
}

#[cfg(unix)]
mod imp {
    use super::ShutdownEvent;
    use tokio::signal::unix::{signal, Signal, SignalKind};

    #[derive(Debug)]
    pub(super) struct Signals {
        sigint: SignalWithDone,
        sighup: SignalWithDone,
        sigterm: SignalWithDone,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            Ok(Self {
                sigint: SignalWithDone::new(SignalKind::interrupt())?,
                sighup: SignalWithDone::new(SignalKind::hangup())?,
                sigterm: SignalWithDone::new(SignalKind::terminate())?,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            loop {
                tokio::select! {
                    recv = self.sigint.signal.recv(), if !self.sigint.done => match recv {
                        Some(()) => break Some(ShutdownEvent::Interrupt),
                        None => self.sigint.done = true,
                    },
                    recv = self.sighup.signal.recv(), if !self.sighup.done => match recv {
                        Some(()) => break Some(ShutdownEvent::Hangup),
                        None => self.sighup.done = true,
                    },
                    recv = self.sigterm.signal.recv(), if !self.sigterm.done => match recv {
                        Some(()) => break Some(ShutdownEvent::Term),
                        None => self.sigterm.done = true,
                    },
                    else => break None,
                }
            }
        }
    }

    #[derive(Debug)]
    struct SignalWithDone {
        signal: Signal,
        done: bool,
    }

    impl SignalWithDone {
        fn new(kind: SignalKind) -> std::io::Result<Self> {
            Ok(Self {
                signal: signal(kind)?,
                done: false,
            })
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::ShutdownEvent;
    use tokio::signal::windows::{ctrl_c, CtrlC};

    #[derive(Debug)]
    pub(super) struct Signals {
        ctrl_c: CtrlC,
        ctrl_c_done: bool,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            Ok(Self {
                ctrl_c: ctrl_c()?,
                ctrl_c_done: false,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            if self.ctrl_c_done {
                return None;
            }
            match self.ctrl_c.recv().await {
                Some(()) => Some(ShutdownEvent::Interrupt),
                None => {
                    self.ctrl_c_done = true;
                    None
                }
            }
        }
    }
}
