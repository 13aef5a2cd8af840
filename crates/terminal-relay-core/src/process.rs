//! The process-spawner boundary consumed by terminal sessions.
//!
//! Sessions never talk to a PTY directly; they drive a [`TerminalProcess`]
//! and consume its [`ProcessEvent`] stream. This keeps the session state
//! machine independent of the transport and testable with scripted
//! processes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Dimensions, ResolvedLaunchConfig, Result};

/// Event emitted by a running terminal process.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// The process launched and reported its pid and working directory
    Ready {
        /// Process id
        pid: i32,
        /// Initial working directory
        cwd: String,
    },
    /// A chunk of raw terminal output
    Data(String),
    /// The shell title changed
    TitleChanged(String),
    /// The process exited; the event stream closes after this
    Exit {
        /// Exit code, if one was reported
        code: Option<i32>,
    },
}

/// A spawned (or spawnable) terminal process.
///
/// `input`, `resize` and `shutdown` are fire-and-forget: failures are the
/// implementation's to log, never the caller's to handle.
#[async_trait]
pub trait TerminalProcess: Send {
    /// Launch the process. On success, returns the event receiver; the
    /// first event is `Ready`. A spawn failure is reported as a launch
    /// error value, never panicked across this boundary.
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<ProcessEvent>>;

    /// Write input bytes to the process.
    fn input(&self, data: &[u8]);

    /// Resize the terminal.
    fn resize(&self, dimensions: Dimensions);

    /// Terminate the process. `immediate` kills outright; otherwise the
    /// process is allowed to exit gracefully. Idempotent.
    fn shutdown(&self, immediate: bool);

    /// Working directory the process was launched with.
    fn initial_cwd(&self) -> String;

    /// Current working directory, best-effort.
    fn cwd(&self) -> String;
}

/// Factory producing [`TerminalProcess`] instances from resolved launch
/// configuration.
pub trait ProcessFactory: Send + Sync {
    /// Create a process for the given configuration. The process is not
    /// started yet.
    fn create(&self, config: &ResolvedLaunchConfig) -> Box<dyn TerminalProcess>;
}
