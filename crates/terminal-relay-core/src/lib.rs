//! # terminal-relay-core
//!
//! Core types for Terminal Relay.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other terminal-relay crates. It provides:
//!
//! - Geometry types (Dimensions)
//! - Session types (SessionId, LaunchConfig, SessionDescriptor)
//! - Event stream payloads (SessionEvent, ReplayEntry)
//! - The process-spawner boundary (TerminalProcess, ProcessFactory)
//! - URI marshalling for the command bridge
//! - Configuration and error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other terminal-relay crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all modules
pub mod config;
pub mod error;
pub mod event;
pub mod geometry;
pub mod process;
pub mod session;
pub mod uri;

// Re-export commonly used types
pub use config::{RelayConfig, SessionSettings, TerminalSettings};
pub use error::{Error, Result};
pub use event::{ReplayEntry, SessionEvent};
pub use geometry::Dimensions;
pub use process::{ProcessEvent, ProcessFactory, TerminalProcess};
pub use session::{
    LaunchConfig, LaunchResolver, ResolvedLaunchConfig, ResolverEnv, SessionDescriptor, SessionId,
    WorkspaceContext,
};
pub use uri::{revive_uri_values, serialize_uri_values, UriComponents};
