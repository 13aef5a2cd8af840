//! # terminal-relay-pty
//!
//! PTY process implementation for Terminal Relay.
//!
//! This crate provides:
//! - PTY (pseudo-terminal) lifecycle management over portable-pty
//! - The event-channel bridge from PTY output to session event pumps
//! - Shell and environment resolution for launch configuration
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on terminal-relay-core
//! and implements the process-spawner boundary consumed by the session
//! layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pty;
pub mod resolver;

// Re-export commonly used types
pub use pty::{PtyProcess, PtySpawner};
pub use resolver::{default_shell, ShellResolver};
