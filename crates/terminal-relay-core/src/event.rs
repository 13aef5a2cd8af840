//! Session event stream payloads.
//!
//! Every observer of a session receives a single multiplexed stream of
//! [`SessionEvent`] values. The tagged-union encoding matches the wire
//! protocol: a `type` discriminant plus camelCase fields.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One replayed span of terminal history: the dimensions that were active
/// and the output produced while they were.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEntry {
    /// Terminal columns during this span
    pub cols: u16,
    /// Terminal rows during this span
    pub rows: u16,
    /// Concatenated raw output for this span
    pub data: String,
}

/// Event emitted on a session's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The process reported ready with its pid and working directory
    Ready {
        /// Process id
        pid: i32,
        /// Initial working directory
        cwd: String,
    },
    /// Coalesced terminal output
    Data {
        /// Raw output chunk
        data: String,
    },
    /// The shell title changed
    TitleChanged {
        /// New title
        title: String,
    },
    /// The process exited
    #[serde(rename_all = "camelCase")]
    Exit {
        /// Exit code, if the process reported one
        exit_code: Option<i32>,
    },
    /// Accumulated history, sent once to each observer that subscribes
    /// after the session's very first
    Replay {
        /// Ordered history spans
        events: Vec<ReplayEntry>,
    },
    /// Liveness probe: any attached client should answer with `orphanReply`
    OrphanQuestion,
    /// A program inside the shell asked the client to execute a command
    #[serde(rename_all = "camelCase")]
    ExecCommand {
        /// Request correlation id, strictly increasing per session
        req_id: u64,
        /// Command identifier
        command_id: String,
        /// Command arguments, URI values in canonical form
        command_args: Vec<serde_json::Value>,
    },
}
