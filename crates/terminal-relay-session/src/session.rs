//! Persistent terminal sessions with reconnect grace, replay and orphan
//! detection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use terminal_relay_core::{
    revive_uri_values, serialize_uri_values, Dimensions, Error, LaunchConfig, ProcessEvent,
    RelayConfig, ResolvedLaunchConfig, Result, SessionEvent, SessionId, TerminalProcess,
};

use crate::coalesce::OutputCoalescer;
use crate::replay::ReplayRecorder;
use crate::sync::{AutoOpenBarrier, SerialQueue};
use crate::timer::OnceTimer;

/// Lifecycle state of a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not started
    Created,
    /// Start call in progress
    Starting,
    /// Process is alive
    Running,
    /// Process exited
    Exited,
    /// Session disposed; all resources released
    Disposed,
}

/// Timing knobs extracted from [`RelayConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    /// Reconnect grace after the last observer detaches
    pub grace: std::time::Duration,
    /// Reduced grace once a fresh client connection arrives
    pub short_grace: std::time::Duration,
    /// Auto-open timeout for the orphan-question latch
    pub orphan_barrier_timeout: std::time::Duration,
    /// Window after latch open within which a reply counts as live
    pub orphan_reply_window: std::time::Duration,
    /// Output coalescing window
    pub coalesce_window: std::time::Duration,
}

impl From<&RelayConfig> for SessionTimings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            grace: config.session.grace(),
            short_grace: config.session.short_grace(),
            orphan_barrier_timeout: config.session.orphan_barrier_timeout(),
            orphan_reply_window: config.session.orphan_reply_window(),
            coalesce_window: config.session.coalesce_window(),
        }
    }
}

/// Outcome of a command request, as delivered by `sendCommandResult`.
type CommandOutcome = std::result::Result<serde_json::Value, serde_json::Value>;

struct Observers {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<SessionEvent>>,
    /// Set by the first subscribe ever; gates replay emission
    seen_first: bool,
}

struct GraceTimers {
    long: OnceTimer,
    short: OnceTimer,
}

/// One remote shell process plus its metadata, observers, history and
/// command bridge. The unit of lifecycle and identity.
///
/// All mutable state is scoped to per-session mutexes; guards are never
/// held across await points.
pub struct TerminalSession {
    id: SessionId,
    workspace_id: String,
    workspace_name: String,
    should_persist: bool,
    timings: SessionTimings,
    resolved: ResolvedLaunchConfig,

    process: Mutex<Option<Box<dyn TerminalProcess>>>,
    state: Mutex<SessionState>,
    pid: AtomicI32,
    title: Mutex<String>,

    recorder: Mutex<ReplayRecorder>,
    observers: Mutex<Observers>,

    pending_commands: Mutex<HashMap<u64, oneshot::Sender<CommandOutcome>>>,
    next_req_id: AtomicU64,

    timers: Mutex<GraceTimers>,
    orphan_latch: Mutex<Option<Arc<AutoOpenBarrier>>>,
    orphan_replied_at: Mutex<Option<Instant>>,
    orphan_checks: SerialQueue,

    disposal: CancellationToken,
    disposed: AtomicBool,
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("workspace_id", &self.workspace_id)
            .field("should_persist", &self.should_persist)
            .finish_non_exhaustive()
    }
}

impl TerminalSession {
    /// Create a session in `Created` state, owning an unstarted process.
    pub fn new(
        id: SessionId,
        process: Box<dyn TerminalProcess>,
        launch: &LaunchConfig,
        resolved: ResolvedLaunchConfig,
        timings: SessionTimings,
    ) -> Self {
        Self {
            id,
            workspace_id: launch.workspace_id.clone(),
            workspace_name: launch.workspace_name.clone(),
            should_persist: launch.should_persist,
            timings,
            recorder: Mutex::new(ReplayRecorder::new(resolved.dimensions)),
            resolved,
            process: Mutex::new(Some(process)),
            state: Mutex::new(SessionState::Created),
            pid: AtomicI32::new(-1),
            title: Mutex::new(String::new()),
            observers: Mutex::new(Observers {
                next_id: 0,
                senders: HashMap::new(),
                seen_first: false,
            }),
            pending_commands: Mutex::new(HashMap::new()),
            next_req_id: AtomicU64::new(0),
            timers: Mutex::new(GraceTimers {
                long: OnceTimer::new(),
                short: OnceTimer::new(),
            }),
            orphan_latch: Mutex::new(None),
            orphan_replied_at: Mutex::new(None),
            orphan_checks: SerialQueue::new(),
            disposal: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Owning workspace id.
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Owning workspace name.
    pub fn workspace_name(&self) -> &str {
        &self.workspace_name
    }

    /// Whether the session survives its last observer detaching.
    pub fn should_persist(&self) -> bool {
        self.should_persist
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Process id, -1 until the process reported ready.
    pub fn pid(&self) -> i32 {
        self.pid.load(Ordering::Relaxed)
    }

    /// Last-known shell title.
    pub fn title(&self) -> String {
        self.title.lock().unwrap().clone()
    }

    /// Working directory the process was launched with.
    pub fn initial_cwd(&self) -> String {
        let guard = self.process.lock().unwrap();
        match guard.as_ref() {
            Some(process) => process.initial_cwd(),
            None => self.resolved.cwd.clone(),
        }
    }

    /// Current working directory, best-effort.
    pub fn cwd(&self) -> String {
        let guard = self.process.lock().unwrap();
        match guard.as_ref() {
            Some(process) => process.cwd(),
            None => self.resolved.cwd.clone(),
        }
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().senders.len()
    }

    /// Token cancelled when the session is disposed.
    pub(crate) fn disposal_token(&self) -> CancellationToken {
        self.disposal.clone()
    }

    /// Launch the owned process and begin pumping its events.
    ///
    /// A spawn failure disposes the session and surfaces as a typed
    /// launch error so the caller can retry with a different shell.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != SessionState::Created {
                warn!(id = %self.id, state = ?*state, "ignoring start on non-created session");
                return Ok(());
            }
            *state = SessionState::Starting;
        }

        let process = self.process.lock().unwrap().take();
        let Some(mut process) = process else {
            self.dispose();
            return Err(Error::Launch("process already released".to_string()));
        };

        match process.start().await {
            Ok(events) => {
                *self.process.lock().unwrap() = Some(process);
                *self.state.lock().unwrap() = SessionState::Running;
                info!(id = %self.id, "session started");
                self.spawn_event_pump(events);
                Ok(())
            }
            Err(e) => {
                warn!(id = %self.id, error = %e, "session failed to start");
                self.dispose();
                Err(e)
            }
        }
    }

    /// Bridge process events into the session event stream: record and
    /// coalesce output, track pid/title, dispose on exit.
    fn spawn_event_pump(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<ProcessEvent>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut coalescer = OutputCoalescer::new(session.timings.coalesce_window);
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(ProcessEvent::Ready { pid, cwd }) => {
                            session.pid.store(pid, Ordering::Relaxed);
                            session.emit(SessionEvent::Ready { pid, cwd });
                        }
                        Some(ProcessEvent::Data(chunk)) => {
                            session.recorder.lock().unwrap().record_data(&chunk);
                            coalescer.push(&chunk);
                        }
                        Some(ProcessEvent::TitleChanged(title)) => {
                            *session.title.lock().unwrap() = title.clone();
                            session.emit(SessionEvent::TitleChanged { title });
                        }
                        Some(ProcessEvent::Exit { code }) => {
                            if let Some(data) = coalescer.take() {
                                session.emit(SessionEvent::Data { data });
                            }
                            info!(id = %session.id, code = ?code, "session process exited");
                            *session.state.lock().unwrap() = SessionState::Exited;
                            session.emit(SessionEvent::Exit { exit_code: code });
                            session.dispose();
                            break;
                        }
                        None => {
                            if let Some(data) = coalescer.take() {
                                session.emit(SessionEvent::Data { data });
                            }
                            break;
                        }
                    },
                    _ = coalescer.flushed() => {
                        if let Some(data) = coalescer.take() {
                            session.emit(SessionEvent::Data { data });
                        }
                    }
                    _ = session.disposal.cancelled() => break,
                }
            }
        });
    }

    /// Attach a new observer.
    ///
    /// Every observer after the session's very first receives one `replay`
    /// event before any live event. Attaching the first current observer
    /// cancels any armed grace timer.
    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let was_empty;
        let observer_id;
        {
            let mut observers = self.observers.lock().unwrap();
            observer_id = observers.next_id;
            observers.next_id += 1;
            if observers.seen_first {
                let events = self.recorder.lock().unwrap().generate_replay();
                let _ = tx.send(SessionEvent::Replay { events });
            }
            observers.seen_first = true;
            was_empty = observers.senders.is_empty();
            observers.senders.insert(observer_id, tx);
        }
        if was_empty {
            // A reconnect arrived in time.
            let mut timers = self.timers.lock().unwrap();
            timers.long.cancel();
            timers.short.cancel();
        }
        debug!(id = %self.id, observer_id, "observer attached");
        EventStream {
            session: Arc::downgrade(self),
            observer_id,
            rx,
        }
    }

    /// Detach an observer. When the last one leaves, a persistent session
    /// arms the disconnect grace timer; a non-persistent one shuts down
    /// immediately.
    pub(crate) fn unsubscribe(self: &Arc<Self>, observer_id: u64) {
        let now_empty = {
            let mut observers = self.observers.lock().unwrap();
            observers.senders.remove(&observer_id);
            observers.senders.is_empty()
        };
        debug!(id = %self.id, observer_id, "observer detached");
        if !now_empty || self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.should_persist {
            info!(id = %self.id, "last observer detached, arming reconnect grace timer");
            self.arm_grace_timer(false);
        } else {
            info!(id = %self.id, "last observer detached, shutting down non-persistent session");
            self.shutdown(true);
        }
    }

    /// Arm the long (or short) grace timer. Exactly one timer is armed at
    /// any instant.
    fn arm_grace_timer(self: &Arc<Self>, short: bool) {
        let weak = Arc::downgrade(self);
        let delay = if short {
            self.timings.short_grace
        } else {
            self.timings.grace
        };
        let mut guard = self.timers.lock().unwrap();
        let timers = &mut *guard;
        let (armed, other) = if short {
            (&mut timers.short, &mut timers.long)
        } else {
            (&mut timers.long, &mut timers.short)
        };
        other.cancel();
        armed.schedule(delay, expire_grace(weak, short));
    }

    /// Swap an armed long grace timer for the short one. No-op when the
    /// short timer is already armed or nothing is armed.
    pub fn reduce_grace_time(self: &Arc<Self>) {
        {
            let timers = self.timers.lock().unwrap();
            if timers.short.is_scheduled() || !timers.long.is_scheduled() {
                return;
            }
        }
        debug!(id = %self.id, "reducing reconnect grace to the short timer");
        self.arm_grace_timer(true);
    }

    /// Whether either grace timer is currently armed.
    pub fn grace_timer_armed(&self) -> bool {
        let timers = self.timers.lock().unwrap();
        timers.long.is_scheduled() || timers.short.is_scheduled()
    }

    /// Determine whether this session has no live observer.
    ///
    /// Checks are serialized per session so concurrent callers share one
    /// in-flight handshake. An armed grace timer answers immediately;
    /// otherwise the question is put to the event stream and judged by
    /// reply freshness.
    pub async fn is_orphaned(self: &Arc<Self>) -> bool {
        let session = Arc::clone(self);
        self.orphan_checks
            .run(move || async move { session.check_orphaned().await })
            .await
    }

    async fn check_orphaned(&self) -> bool {
        if self.grace_timer_armed() {
            // An armed timer means no observer is attached.
            return true;
        }

        let (barrier, ask) = {
            let mut latch = self.orphan_latch.lock().unwrap();
            match latch.as_ref() {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    *self.orphan_replied_at.lock().unwrap() = None;
                    let barrier = AutoOpenBarrier::new(self.timings.orphan_barrier_timeout);
                    *latch = Some(Arc::clone(&barrier));
                    (barrier, true)
                }
            }
        };
        if ask {
            debug!(id = %self.id, "asking observers whether the session is orphaned");
            self.emit(SessionEvent::OrphanQuestion);
        }

        barrier.wait().await;

        {
            let mut latch = self.orphan_latch.lock().unwrap();
            if latch
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &barrier))
            {
                *latch = None;
            }
        }

        let replied_at = *self.orphan_replied_at.lock().unwrap();
        match replied_at {
            None => true,
            Some(at) => at.elapsed() > self.timings.orphan_reply_window,
        }
    }

    /// Record a liveness reply and open the outstanding latch, if any.
    pub fn orphan_reply(&self) {
        *self.orphan_replied_at.lock().unwrap() = Some(Instant::now());
        let latch = self.orphan_latch.lock().unwrap().take();
        if let Some(latch) = latch {
            latch.open();
        }
    }

    /// Ask the client to execute a command and await its result.
    ///
    /// There is no timeout on this path: a request that never receives a
    /// result stays pending until the session is disposed, at which point
    /// it surfaces as [`Error::CommandAbandoned`].
    pub async fn execute_command(
        &self,
        command_id: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::CommandAbandoned);
        }

        let req_id = self.next_req_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending_commands.lock().unwrap().insert(req_id, tx);

        let mut command_args = args;
        for value in &mut command_args {
            serialize_uri_values(value);
        }
        debug!(id = %self.id, req_id, command_id, "forwarding command request to client");
        self.emit(SessionEvent::ExecCommand {
            req_id,
            command_id: command_id.to_string(),
            command_args,
        });

        match rx.await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(payload)) => Err(Error::CommandFailed(payload)),
            Err(_) => Err(Error::CommandAbandoned),
        }
    }

    /// Deliver a command result from the client.
    ///
    /// Unknown or already-answered request ids are ignored; duplicate and
    /// late results are expected under transport retries.
    pub fn send_command_result(&self, req_id: u64, is_error: bool, payload: serde_json::Value) {
        let sender = self.pending_commands.lock().unwrap().remove(&req_id);
        let Some(sender) = sender else {
            debug!(id = %self.id, req_id, "dropping stale command result");
            return;
        };
        let mut payload = payload;
        revive_uri_values(&mut payload);
        let outcome = if is_error { Err(payload) } else { Ok(payload) };
        let _ = sender.send(outcome);
    }

    /// Write input to the process. Fire-and-forget.
    pub fn input(&self, data: &[u8]) {
        let guard = self.process.lock().unwrap();
        if let Some(process) = guard.as_ref() {
            process.input(data);
        }
    }

    /// Resize the terminal and record the resize in the replay history.
    pub fn resize(&self, dimensions: Dimensions) {
        if !dimensions.is_valid() {
            return;
        }
        {
            let guard = self.process.lock().unwrap();
            if let Some(process) = guard.as_ref() {
                process.resize(dimensions);
            }
        }
        self.recorder
            .lock()
            .unwrap()
            .record_resize(dimensions.cols, dimensions.rows);
    }

    /// Terminate the process. Immediate shutdown also disposes the
    /// session; a graceful one lets the exit event drive disposal.
    /// Idempotent.
    pub fn shutdown(&self, immediate: bool) {
        {
            let guard = self.process.lock().unwrap();
            if let Some(process) = guard.as_ref() {
                process.shutdown(immediate);
            }
        }
        if immediate {
            self.dispose();
        }
    }

    /// Release timers, observers, the process handle and pending
    /// commands. Idempotent and irreversible.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(id = %self.id, "disposing session");
        *self.state.lock().unwrap() = SessionState::Disposed;
        {
            let mut timers = self.timers.lock().unwrap();
            timers.long.cancel();
            timers.short.cancel();
        }
        self.observers.lock().unwrap().senders.clear();
        self.pending_commands.lock().unwrap().clear();
        let latch = self.orphan_latch.lock().unwrap().take();
        if let Some(latch) = latch {
            latch.open();
        }
        *self.process.lock().unwrap() = None;
        self.disposal.cancel();
    }

    /// Fan an event out to every attached observer.
    fn emit(&self, event: SessionEvent) {
        let observers = self.observers.lock().unwrap();
        for sender in observers.senders.values() {
            let _ = sender.send(event.clone());
        }
    }
}

/// Grace-timer expiry body, shared by the long and short timers.
fn expire_grace(
    weak: Weak<TerminalSession>,
    short: bool,
) -> impl std::future::Future<Output = ()> + Send + 'static {
    async move {
        if let Some(session) = weak.upgrade() {
            let kind = if short { "short" } else { "long" };
            info!(id = %session.id, timer = kind, "reconnect grace expired, shutting down");
            session.shutdown(true);
        }
    }
}

/// An observer's handle onto a session event stream.
///
/// Dropping the stream detaches the observer, which may arm the session's
/// grace timer or tear it down (see [`TerminalSession::subscribe`]).
#[derive(Debug)]
pub struct EventStream {
    session: Weak<TerminalSession>,
    observer_id: u64,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Receive the next event; `None` once the session is disposed.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session.unsubscribe(self.observer_id);
        }
    }
}
