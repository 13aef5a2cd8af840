//! The RPC-facing session registry.
//!
//! Owns the authoritative map of live sessions, allocates session ids, and
//! forwards the call surface onto individual [`TerminalSession`]s. The
//! transport that carries calls and events is an external collaborator;
//! the registry only exposes typed methods over serde payload types.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use terminal_relay_core::{
    Dimensions, Error, LaunchConfig, LaunchResolver, ProcessFactory, RelayConfig,
    ResolvedLaunchConfig, ResolverEnv, Result, SessionDescriptor, SessionId, WorkspaceContext,
};

use crate::session::{EventStream, SessionTimings, TerminalSession};

/// Result of a `createSession` call.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    /// Allocated session id
    pub session_id: SessionId,
    /// The launch configuration after resolution
    pub resolved: ResolvedLaunchConfig,
}

/// Maps session ids to live [`TerminalSession`]s and dispatches inbound
/// calls.
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<TerminalSession>>>>,
    next_id: AtomicU64,
    factory: Arc<dyn ProcessFactory>,
    resolver: Arc<dyn LaunchResolver>,
    config: RelayConfig,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("session_count", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Create a registry with the given process factory and launch
    /// resolver.
    pub fn new(
        factory: Arc<dyn ProcessFactory>,
        resolver: Arc<dyn LaunchResolver>,
        config: RelayConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            factory,
            resolver,
            config,
        }
    }

    /// Create a registry wired to the native PTY spawner and system shell
    /// resolver.
    pub fn with_native_pty(config: RelayConfig) -> Self {
        Self::new(
            Arc::new(terminal_relay_pty::PtySpawner),
            Arc::new(terminal_relay_pty::ShellResolver),
            config,
        )
    }

    /// Resolve launch configuration, allocate the next session id and
    /// register a new session in `Created` state. Never fails for valid
    /// input; resolution falls back to best-effort defaults.
    pub fn create_session(
        &self,
        mut launch: LaunchConfig,
        resolver_env: ResolverEnv,
        workspace: WorkspaceContext,
    ) -> CreatedSession {
        if !launch.dimensions.is_valid() {
            launch.dimensions = Dimensions::new(
                self.config.terminal.default_rows,
                self.config.terminal.default_cols,
            );
        }
        let resolved = self.resolver.resolve(&launch, &resolver_env, &workspace);
        let session_id = SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let process = self.factory.create(&resolved);
        let session = Arc::new(TerminalSession::new(
            session_id,
            process,
            &launch,
            resolved.clone(),
            SessionTimings::from(&self.config),
        ));

        self.sessions
            .lock()
            .unwrap()
            .insert(session_id, Arc::clone(&session));
        self.spawn_reaper(session_id, &session);

        info!(
            id = %session_id,
            shell = %resolved.shell,
            workspace = %launch.workspace_name,
            "session created"
        );
        CreatedSession {
            session_id,
            resolved,
        }
    }

    /// Remove the session from the map once it is disposed, whatever
    /// triggered the disposal (exit, shutdown, grace expiry).
    fn spawn_reaper(&self, session_id: SessionId, session: &Arc<TerminalSession>) {
        let sessions = Arc::clone(&self.sessions);
        let disposal = session.disposal_token();
        tokio::spawn(async move {
            disposal.cancelled().await;
            sessions.lock().unwrap().remove(&session_id);
            debug!(id = %session_id, "session removed from registry");
        });
    }

    fn get(&self, session_id: SessionId) -> Result<Arc<TerminalSession>> {
        self.sessions
            .lock()
            .unwrap()
            .get(&session_id)
            .cloned()
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// Start a created session's process.
    pub async fn start_session(&self, session_id: SessionId) -> Result<()> {
        self.get(session_id)?.start().await
    }

    /// Forward input to a session. Fire-and-forget.
    pub fn input(&self, session_id: SessionId, data: &[u8]) -> Result<()> {
        self.get(session_id)?.input(data);
        Ok(())
    }

    /// Resize a session's terminal. Fire-and-forget.
    pub fn resize(&self, session_id: SessionId, cols: u16, rows: u16) -> Result<()> {
        self.get(session_id)?.resize(Dimensions::new(rows, cols));
        Ok(())
    }

    /// Shut a session down.
    pub fn shutdown(&self, session_id: SessionId, immediate: bool) -> Result<()> {
        self.get(session_id)?.shutdown(immediate);
        Ok(())
    }

    /// Working directory the session's process was launched with.
    pub fn get_initial_cwd(&self, session_id: SessionId) -> Result<String> {
        Ok(self.get(session_id)?.initial_cwd())
    }

    /// Current working directory of the session's process.
    pub fn get_cwd(&self, session_id: SessionId) -> Result<String> {
        Ok(self.get(session_id)?.cwd())
    }

    /// Deliver a command result to a session's pending request. Stale and
    /// duplicate results are silently ignored.
    pub fn send_command_result(
        &self,
        session_id: SessionId,
        req_id: u64,
        is_error: bool,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.get(session_id)?
            .send_command_result(req_id, is_error, payload);
        Ok(())
    }

    /// Signal a session's outstanding orphan latch, if any.
    pub fn orphan_reply(&self, session_id: SessionId) -> Result<()> {
        self.get(session_id)?.orphan_reply();
        Ok(())
    }

    /// Entry point for the process side-channel: ask the client attached
    /// to a session to execute a command and await its result. No timeout;
    /// callers bound their own waits.
    pub async fn execute_command(
        &self,
        session_id: SessionId,
        command_id: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let session = self.get(session_id)?;
        session.execute_command(command_id, args).await
    }

    /// Subscribe to a session's event stream.
    pub fn subscribe(&self, session_id: SessionId) -> Result<EventStream> {
        Ok(self.get(session_id)?.subscribe())
    }

    /// List persistent sessions that are currently orphaned.
    ///
    /// A fresh client connection implies prior connections are stale, so
    /// `is_initial_connection` first reduces every session's grace period.
    /// Orphan status is queried concurrently across sessions.
    pub async fn list_sessions(&self, is_initial_connection: bool) -> Vec<SessionDescriptor> {
        let sessions: Vec<Arc<TerminalSession>> =
            self.sessions.lock().unwrap().values().cloned().collect();

        if is_initial_connection {
            for session in &sessions {
                session.reduce_grace_time();
            }
        }

        let mut checks = JoinSet::new();
        for session in sessions {
            checks.spawn(async move {
                let is_orphan = session.is_orphaned().await;
                (session, is_orphan)
            });
        }

        let mut descriptors = Vec::new();
        while let Some(joined) = checks.join_next().await {
            let Ok((session, is_orphan)) = joined else {
                warn!("orphan check task failed");
                continue;
            };
            if session.should_persist() && is_orphan {
                descriptors.push(SessionDescriptor {
                    id: session.id(),
                    title: session.title(),
                    pid: session.pid(),
                    workspace_id: session.workspace_id().to_string(),
                    workspace_name: session.workspace_name().to_string(),
                    cwd: session.cwd(),
                    is_orphan,
                });
            }
        }
        descriptors.sort_by_key(|descriptor| descriptor.id);
        descriptors
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Immediately shut down every session.
    pub fn shutdown_all(&self) {
        let sessions: Vec<Arc<TerminalSession>> =
            self.sessions.lock().unwrap().values().cloned().collect();
        for session in sessions {
            session.shutdown(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use terminal_relay_core::SessionEvent;

    use crate::testing::{ScriptedFactory, StaticResolver};

    fn make_registry() -> (SessionRegistry, Arc<ScriptedFactory>) {
        let factory = Arc::new(ScriptedFactory::new());
        let registry = SessionRegistry::new(
            Arc::clone(&factory) as Arc<dyn ProcessFactory>,
            Arc::new(StaticResolver),
            RelayConfig::default(),
        );
        (registry, factory)
    }

    fn persistent_launch() -> LaunchConfig {
        LaunchConfig {
            workspace_id: "ws-1".to_string(),
            workspace_name: "test".to_string(),
            ..LaunchConfig::default()
        }
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_allocates_monotonic_ids() {
        let (registry, _factory) = make_registry();

        let first = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        let second = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );

        assert_eq!(first.session_id, SessionId::new(1));
        assert_eq!(second.session_id, SessionId::new(2));
        assert_eq!(registry.session_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_resolves_launch_config() {
        let (registry, factory) = make_registry();

        let launch = LaunchConfig {
            shell: Some("/bin/dash".to_string()),
            cwd: Some("/work".to_string()),
            ..persistent_launch()
        };
        let created = registry.create_session(
            launch,
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );

        assert_eq!(created.resolved.shell, "/bin/dash");
        assert_eq!(created.resolved.cwd, "/work");
        assert_eq!(factory.configs()[0], created.resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_session_is_missing() {
        let (registry, _factory) = make_registry();
        let missing = SessionId::new(99);

        assert!(matches!(
            registry.start_session(missing).await,
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.input(missing, b"x"),
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.resize(missing, 80, 24),
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.shutdown(missing, true),
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.get_cwd(missing),
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.subscribe(missing),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_surfaces_and_removes_session() {
        let (registry, factory) = make_registry();
        factory.fail_next_start();

        let created = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        assert_eq!(registry.session_count(), 1);

        let result = registry.start_session(created.session_id).await;
        assert!(matches!(result, Err(Error::Launch(_))));

        settle().await;
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_flow_through_registry_subscription() {
        let (registry, factory) = make_registry();

        let created = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        registry.start_session(created.session_id).await.unwrap();

        let mut stream = registry.subscribe(created.session_id).unwrap();
        factory.handle(0).emit_data("hello");

        assert_eq!(
            stream.recv().await.unwrap(),
            SessionEvent::Data {
                data: "hello".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwarded_calls_reach_the_process() {
        let (registry, factory) = make_registry();

        let created = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        registry.start_session(created.session_id).await.unwrap();

        registry.input(created.session_id, b"echo hi\n").unwrap();
        registry.resize(created.session_id, 100, 30).unwrap();

        let handle = factory.handle(0);
        assert_eq!(handle.inputs(), vec![b"echo hi\n".to_vec()]);
        assert_eq!(handle.resizes(), vec![Dimensions::new(30, 100)]);

        assert_eq!(registry.get_initial_cwd(created.session_id).unwrap(), "/");
        assert_eq!(registry.get_cwd(created.session_id).unwrap(), "/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_removes_session() {
        let (registry, _factory) = make_registry();

        let created = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        registry.start_session(created.session_id).await.unwrap();

        registry.shutdown(created.session_id, true).unwrap();
        settle().await;

        assert_eq!(registry.session_count(), 0);
        assert!(matches!(
            registry.get_cwd(created.session_id),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_command_result_is_accepted_quietly() {
        let (registry, _factory) = make_registry();

        let created = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        registry.start_session(created.session_id).await.unwrap();

        registry
            .send_command_result(created.session_id, 42, false, json!(null))
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_sessions_reduces_grace_and_reports_orphans() {
        let (registry, _factory) = make_registry();

        let created = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        registry.start_session(created.session_id).await.unwrap();

        // Arm the long grace timer by detaching the only observer.
        let stream = registry.subscribe(created.session_id).unwrap();
        drop(stream);

        let listed = registry.list_sessions(true).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.session_id);
        assert!(listed[0].is_orphan);

        // The initial connection downgraded the timer to the short grace.
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_sessions_excludes_answered_sessions() {
        let (registry, _factory) = make_registry();

        let orphaned = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        registry.start_session(orphaned.session_id).await.unwrap();
        let orphan_stream = registry.subscribe(orphaned.session_id).unwrap();
        drop(orphan_stream);

        let attended = registry.create_session(
            persistent_launch(),
            ResolverEnv::default(),
            WorkspaceContext::default(),
        );
        registry.start_session(attended.session_id).await.unwrap();
        let mut stream = registry.subscribe(attended.session_id).unwrap();
        let registry = Arc::new(registry);
        let responder = Arc::clone(&registry);
        let attended_id = attended.session_id;
        tokio::spawn(async move {
            while let Some(event) = stream.recv().await {
                if event == SessionEvent::OrphanQuestion {
                    responder.orphan_reply(attended_id).unwrap();
                }
            }
        });

        let listed = registry.list_sessions(false).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, orphaned.session_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_all_clears_registry() {
        let (registry, _factory) = make_registry();

        for _ in 0..3 {
            let created = registry.create_session(
                persistent_launch(),
                ResolverEnv::default(),
                WorkspaceContext::default(),
            );
            registry.start_session(created.session_id).await.unwrap();
        }
        assert_eq!(registry.session_count(), 3);

        registry.shutdown_all();
        settle().await;
        assert_eq!(registry.session_count(), 0);
    }
}
