//! Output coalescing at a bounded emit rate.
//!
//! High-throughput processes can produce thousands of tiny output chunks
//! per second. The coalescer batches them inside a short time window so
//! observers see at most one `data` event per window, in production order.

use std::future::pending;
use std::mem;
use std::time::Duration;

use tokio::time::Instant;

/// Time-windowed output batcher for one session.
///
/// Driven from the session's event pump: [`push`](Self::push) accumulates,
/// [`flushed`](Self::flushed) completes when the armed window elapses, and
/// [`take`](Self::take) drains the batch.
#[derive(Debug)]
pub struct OutputCoalescer {
    window: Duration,
    buffer: String,
    deadline: Option<Instant>,
}

impl OutputCoalescer {
    /// Create a coalescer with the given batching window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buffer: String::new(),
            deadline: None,
        }
    }

    /// Buffer a chunk. The first chunk of a batch arms the flush deadline.
    pub fn push(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.buffer.push_str(chunk);
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.window);
        }
    }

    /// Resolves when the armed flush deadline elapses; pending forever
    /// while no batch is armed.
    pub async fn flushed(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => pending().await,
        }
    }

    /// Drain the current batch and disarm the deadline.
    pub fn take(&mut self) -> Option<String> {
        self.deadline = None;
        if self.buffer.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.buffer))
        }
    }

    /// Whether a batch is currently buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}
