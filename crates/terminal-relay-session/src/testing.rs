//! Scripted process doubles for exercising sessions without a real PTY.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use terminal_relay_core::{
    Dimensions, Error, LaunchConfig, LaunchResolver, ProcessEvent, ProcessFactory,
    ResolvedLaunchConfig, ResolverEnv, Result, TerminalProcess, WorkspaceContext,
};

/// A [`TerminalProcess`] whose events are injected by the test through a
/// [`ScriptedHandle`].
pub struct ScriptedProcess {
    fail_start: bool,
    cwd: String,
    events: Option<mpsc::UnboundedReceiver<ProcessEvent>>,
    handle: ScriptedHandle,
}

/// Test-side handle onto a [`ScriptedProcess`]: inject events, inspect
/// recorded calls.
#[derive(Clone)]
pub struct ScriptedHandle {
    events: mpsc::UnboundedSender<ProcessEvent>,
    inputs: Arc<Mutex<Vec<Vec<u8>>>>,
    resizes: Arc<Mutex<Vec<Dimensions>>>,
    shutdowns: Arc<Mutex<Vec<bool>>>,
}

impl ScriptedProcess {
    /// Create a process that starts successfully.
    pub fn new() -> (Self, ScriptedHandle) {
        Self::with_options(false, "/scripted")
    }

    /// Create a process with explicit start behavior and cwd.
    pub fn with_options(fail_start: bool, cwd: &str) -> (Self, ScriptedHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ScriptedHandle {
            events: tx,
            inputs: Arc::new(Mutex::new(Vec::new())),
            resizes: Arc::new(Mutex::new(Vec::new())),
            shutdowns: Arc::new(Mutex::new(Vec::new())),
        };
        let process = Self {
            fail_start,
            cwd: cwd.to_string(),
            events: Some(rx),
            handle: handle.clone(),
        };
        (process, handle)
    }
}

impl ScriptedHandle {
    /// Inject a raw process event.
    pub fn emit(&self, event: ProcessEvent) {
        let _ = self.events.send(event);
    }

    /// Inject a `Ready` event.
    pub fn emit_ready(&self, pid: i32, cwd: &str) {
        self.emit(ProcessEvent::Ready {
            pid,
            cwd: cwd.to_string(),
        });
    }

    /// Inject an output chunk.
    pub fn emit_data(&self, chunk: &str) {
        self.emit(ProcessEvent::Data(chunk.to_string()));
    }

    /// Inject a title change.
    pub fn emit_title(&self, title: &str) {
        self.emit(ProcessEvent::TitleChanged(title.to_string()));
    }

    /// Inject process exit.
    pub fn emit_exit(&self, code: Option<i32>) {
        self.emit(ProcessEvent::Exit { code });
    }

    /// Input bytes the session forwarded to the process.
    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }

    /// Resizes the session forwarded to the process.
    pub fn resizes(&self) -> Vec<Dimensions> {
        self.resizes.lock().unwrap().clone()
    }

    /// Shutdown calls (their `immediate` flags) the process received.
    pub fn shutdowns(&self) -> Vec<bool> {
        self.shutdowns.lock().unwrap().clone()
    }
}

#[async_trait]
impl TerminalProcess for ScriptedProcess {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<ProcessEvent>> {
        if self.fail_start {
            return Err(Error::Launch("scripted launch failure".to_string()));
        }
        Ok(self.events.take().expect("scripted process started twice"))
    }

    fn input(&self, data: &[u8]) {
        self.handle.inputs.lock().unwrap().push(data.to_vec());
    }

    fn resize(&self, dimensions: Dimensions) {
        self.handle.resizes.lock().unwrap().push(dimensions);
    }

    fn shutdown(&self, immediate: bool) {
        self.handle.shutdowns.lock().unwrap().push(immediate);
    }

    fn initial_cwd(&self) -> String {
        self.cwd.clone()
    }

    fn cwd(&self) -> String {
        self.cwd.clone()
    }
}

/// A [`ProcessFactory`] handing out [`ScriptedProcess`]es and keeping
/// their handles for the test to drive.
#[derive(Default)]
pub struct ScriptedFactory {
    handles: Arc<Mutex<Vec<ScriptedHandle>>>,
    configs: Arc<Mutex<Vec<ResolvedLaunchConfig>>>,
    fail_next: AtomicBool,
}

impl ScriptedFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next created process fail its start call.
    pub fn fail_next_start(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Handle for the `index`-th created process.
    pub fn handle(&self, index: usize) -> ScriptedHandle {
        self.handles.lock().unwrap()[index].clone()
    }

    /// Launch configurations the factory has seen.
    pub fn configs(&self) -> Vec<ResolvedLaunchConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl ProcessFactory for ScriptedFactory {
    fn create(&self, config: &ResolvedLaunchConfig) -> Box<dyn TerminalProcess> {
        let fail_start = self.fail_next.swap(false, Ordering::SeqCst);
        let (process, handle) = ScriptedProcess::with_options(fail_start, &config.cwd);
        self.handles.lock().unwrap().push(handle);
        self.configs.lock().unwrap().push(config.clone());
        Box::new(process)
    }
}

/// A deterministic [`LaunchResolver`] that stays off the process
/// environment: requested values pass through, gaps get fixed defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticResolver;

impl LaunchResolver for StaticResolver {
    fn resolve(
        &self,
        launch: &LaunchConfig,
        resolver_env: &ResolverEnv,
        workspace: &WorkspaceContext,
    ) -> ResolvedLaunchConfig {
        let mut env = resolver_env.vars.clone();
        env.extend(launch.env.clone());
        ResolvedLaunchConfig {
            shell: launch.shell.clone().unwrap_or_else(|| "/bin/sh".to_string()),
            args: launch.args.clone(),
            env,
            cwd: launch
                .cwd
                .clone()
                .or_else(|| workspace.folders.first().cloned())
                .unwrap_or_else(|| "/".to_string()),
            dimensions: launch.dimensions,
        }
    }
}
