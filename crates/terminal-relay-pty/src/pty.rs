//! PTY (Pseudo-Terminal) handling with portable-pty.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use portable_pty::{
    native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize, PtySystem,
};
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, info, warn};

use terminal_relay_core::{
    Dimensions, Error, ProcessEvent, ProcessFactory, ResolvedLaunchConfig, Result, TerminalProcess,
};

/// A terminal process backed by a native PTY.
///
/// Created by [`PtySpawner`]; inert until [`TerminalProcess::start`] is
/// called. After a successful start the event receiver yields `Ready`
/// first, then `Data` chunks in production order, and finally one `Exit`.
pub struct PtyProcess {
    config: ResolvedLaunchConfig,
    pid: AtomicI32,
    inner: Mutex<Option<PtyInner>>,
}

struct PtyInner {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("shell", &self.config.shell)
            .field("dimensions", &self.config.dimensions)
            .finish_non_exhaustive()
    }
}

impl PtyProcess {
    /// Create an unstarted PTY process for the given configuration.
    pub fn new(config: ResolvedLaunchConfig) -> Self {
        Self {
            config,
            pid: AtomicI32::new(-1),
            inner: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TerminalProcess for PtyProcess {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<ProcessEvent>> {
        info!(
            shell = %self.config.shell,
            dimensions = %self.config.dimensions,
            cwd = %self.config.cwd,
            "spawning PTY process"
        );

        let pty_system = native_pty_system();
        let pty_size = PtySize {
            rows: self.config.dimensions.rows,
            cols: self.config.dimensions.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(pty_size)
            .map_err(|e| Error::Launch(format!("Failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(&self.config.shell);
        for arg in &self.config.args {
            cmd.arg(arg);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        cmd.cwd(&self.config.cwd);

        let mut child = pair.slave.spawn_command(cmd).map_err(|e| {
            Error::Launch(format!("Failed to spawn '{}': {e}", self.config.shell))
        })?;
        // The parent keeps only the master side; holding the slave open
        // would stop the reader from ever seeing EOF.
        drop(pair.slave);

        let killer = child.clone_killer();
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Launch(format!("Failed to take PTY writer: {e}")))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Launch(format!("Failed to clone PTY reader: {e}")))?;

        let pid = child.process_id().map(|p| p as i32).unwrap_or(-1);
        self.pid.store(pid, Ordering::Relaxed);

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ProcessEvent::Ready {
            pid,
            cwd: self.config.cwd.clone(),
        });

        // One blocking task drains the master until EOF and only then reaps
        // the child, so Data events always precede Exit.
        task::spawn_blocking(move || {
            let mut buffer = [0u8; 4096];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buffer[..n]).into_owned();
                        if tx.send(ProcessEvent::Data(chunk)).is_err() {
                            break;
                        }
                    }
                    // EIO is how the master reports a closed slave side
                    Err(e) => {
                        debug!("PTY read ended: {e}");
                        break;
                    }
                }
            }
            let code = match child.wait() {
                Ok(status) => Some(status.exit_code() as i32),
                Err(e) => {
                    warn!("failed to reap PTY child: {e}");
                    None
                }
            };
            let _ = tx.send(ProcessEvent::Exit { code });
        });

        *self.inner.lock().unwrap() = Some(PtyInner {
            master: pair.master,
            writer,
            killer,
        });

        info!(pid, "PTY process spawned");
        Ok(rx)
    }

    fn input(&self, data: &[u8]) {
        let mut guard = self.inner.lock().unwrap();
        if let Some(inner) = guard.as_mut() {
            let result = inner
                .writer
                .write_all(data)
                .and_then(|_| inner.writer.flush());
            if let Err(e) = result {
                debug!("PTY write failed: {e}");
            }
        }
    }

    fn resize(&self, dimensions: Dimensions) {
        let guard = self.inner.lock().unwrap();
        if let Some(inner) = guard.as_ref() {
            let size = PtySize {
                rows: dimensions.rows,
                cols: dimensions.cols,
                pixel_width: 0,
                pixel_height: 0,
            };
            if let Err(e) = inner.master.resize(size) {
                warn!("PTY resize failed: {e}");
            }
        }
    }

    fn shutdown(&self, immediate: bool) {
        let mut guard = self.inner.lock().unwrap();
        let Some(mut inner) = guard.take() else {
            return;
        };
        if immediate {
            if let Err(e) = inner.killer.kill() {
                debug!("PTY kill failed: {e}");
            }
        }
        // Dropping the master closes the PTY; a still-running shell sees
        // EOF/SIGHUP and exits on its own.
        drop(inner);
    }

    fn initial_cwd(&self) -> String {
        self.config.cwd.clone()
    }

    fn cwd(&self) -> String {
        #[cfg(target_os = "linux")]
        {
            let pid = self.pid.load(Ordering::Relaxed);
            if pid > 0 {
                if let Ok(path) = std::fs::read_link(format!("/proc/{pid}/cwd")) {
                    return path.to_string_lossy().into_owned();
                }
            }
        }
        self.config.cwd.clone()
    }
}

/// [`ProcessFactory`] producing [`PtyProcess`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtySpawner;

impl ProcessFactory for PtySpawner {
    fn create(&self, config: &ResolvedLaunchConfig) -> Box<dyn TerminalProcess> {
        Box::new(PtyProcess::new(config.clone()))
    }
}
