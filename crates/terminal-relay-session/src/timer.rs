//! One-shot cancelable timers for reconnect grace handling.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A schedule/cancel wrapper over a spawned sleep task.
///
/// Re-scheduling replaces the pending run; `cancel` on an unscheduled or
/// already-fired timer is a safe no-op.
#[derive(Debug, Default)]
pub struct OnceTimer {
    handle: Option<JoinHandle<()>>,
}

impl OnceTimer {
    /// Create an unscheduled timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `delay`, replacing any pending run.
    ///
    /// Must be called inside a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    /// Cancel the pending run, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether the timer is armed and has not fired yet.
    pub fn is_scheduled(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for OnceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = OnceTimer::new();

        let counter = Arc::clone(&fired);
        timer.schedule(Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_scheduled());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = OnceTimer::new();

        let counter = Arc::clone(&fired);
        timer.schedule(Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();
        assert!(!timer.is_scheduled());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_is_noop() {
        let mut timer = OnceTimer::new();
        timer.schedule(Duration::from_millis(10), async {});

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!timer.is_scheduled());
        timer.cancel();
        timer.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_run() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = OnceTimer::new();

        for _ in 0..3 {
            let counter = Arc::clone(&fired);
            timer.schedule(Duration::from_millis(100), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
