//! Session identity and launch configuration types.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Dimensions;

/// Unique identifier for a terminal session.
///
/// Ids are allocated monotonically by the registry and are never reused
/// within the registry's lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a session id from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested configuration for creating a new terminal session.
///
/// Everything here is the client's *request*; resolution turns it into a
/// concrete [`ResolvedLaunchConfig`] with best-effort defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Shell executable to run; resolved from the environment when empty
    pub shell: Option<String>,
    /// Shell arguments
    pub args: Vec<String>,
    /// Environment overrides applied on top of the resolved environment
    pub env: HashMap<String, String>,
    /// Requested working directory (may contain `${VAR}` substitutions)
    pub cwd: Option<String>,
    /// Requested terminal dimensions
    pub dimensions: Dimensions,
    /// Keep the process alive across client disconnects (grace period);
    /// when false the session is torn down with its last observer
    pub should_persist: bool,
    /// Opaque id of the owning workspace
    pub workspace_id: String,
    /// Human-readable name of the owning workspace
    pub workspace_name: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            shell: None,
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            dimensions: Dimensions::default(),
            should_persist: true,
            workspace_id: String::new(),
            workspace_name: String::new(),
        }
    }
}

/// Concrete launch configuration produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLaunchConfig {
    /// Shell executable path
    pub shell: String,
    /// Shell arguments
    pub args: Vec<String>,
    /// Fully merged environment
    pub env: HashMap<String, String>,
    /// Concrete working directory
    pub cwd: String,
    /// Terminal dimensions
    pub dimensions: Dimensions,
}

/// Extra environment variables contributed by the caller's resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResolverEnv {
    /// Variables merged between the process environment and launch overrides
    pub vars: HashMap<String, String>,
}

/// Workspace folders used to compute a default working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WorkspaceContext {
    /// Absolute folder paths, in priority order
    pub folders: Vec<String>,
}

/// Descriptor of a live session, as returned by `listSessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    /// Session identifier
    pub id: SessionId,
    /// Last-known shell title
    pub title: String,
    /// Process id, -1 until the process reported ready
    pub pid: i32,
    /// Opaque id of the owning workspace
    pub workspace_id: String,
    /// Human-readable name of the owning workspace
    pub workspace_name: String,
    /// Current working directory
    pub cwd: String,
    /// Whether the session currently has no attached observer
    pub is_orphan: bool,
}

/// Shell/environment resolution collaborator.
///
/// Turns a requested [`LaunchConfig`] into a concrete one. Resolution never
/// fails: missing or invalid pieces fall back to best-effort defaults.
pub trait LaunchResolver: Send + Sync {
    /// Resolve shell, arguments, environment and working directory.
    fn resolve(
        &self,
        launch: &LaunchConfig,
        resolver_env: &ResolverEnv,
        workspace: &WorkspaceContext,
    ) -> ResolvedLaunchConfig;
}
