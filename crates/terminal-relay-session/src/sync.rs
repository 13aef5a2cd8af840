//! Concurrency primitives for the orphan-detection handshake.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One-shot latch that opens explicitly or after a timeout.
///
/// `open()` is idempotent; the first call (from either path) releases all
/// waiters and cancels the pending timeout.
#[derive(Debug)]
pub struct AutoOpenBarrier {
    token: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl AutoOpenBarrier {
    /// Create a barrier that opens itself after `timeout`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(timeout: Duration) -> Arc<Self> {
        let token = CancellationToken::new();
        let auto_open = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            auto_open.cancel();
        });
        Arc::new(Self {
            token,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Open the barrier. Subsequent calls are no-ops.
    pub fn open(&self) {
        if let Some(timer) = self.timer.lock().unwrap().take() {
            timer.abort();
        }
        self.token.cancel();
    }

    /// Wait until the barrier is open.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Whether the barrier has opened.
    pub fn is_open(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Runs submitted async tasks one at a time, in submission order.
///
/// Each caller gets its own task's result back. Fairness comes from the
/// FIFO queueing of the tokio mutex.
#[derive(Debug, Default)]
pub struct SerialQueue {
    gate: tokio::sync::Mutex<()>,
}

impl SerialQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once every earlier submission has finished.
    pub async fn run<T, F, Fut>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.gate.lock().await;
        task().await
    }
}
