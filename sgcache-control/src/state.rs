//! The shared running/wakeup state one long-running loop (the follower
//! or the scanner) exposes to its control-plane handler.
//!
//! Grounded on the original implementation's three
//! `threading.Event`/`threading.Condition` primitives
//! (`_is_running`, `_poll_signal`, `_sleep_signal`): `_is_running` gates
//! whether the loop is allowed to proceed past its sleep at all,
//! `_poll_signal` is what `poll()` notifies to wake an idle sleep
//! immediately, and `_sleep_signal` is notified once per iteration
//! right as the loop enters its sleep — which is what lets
//! `poll(wait=true)` block until one full iteration has actually run,
//! not just until the sleep was interrupted. `tokio::sync::Notify` is
//! the direct async analogue of a condition variable here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Shared between a long-running loop task and whatever control-plane
/// handler answers `start`/`stop`/`poll` requests for it.
pub struct ControlState {
    running: AtomicBool,
    poll_signal: Notify,
    iteration_done: Notify,
}

impl ControlState {
    /// Subsystems start running by default, matching the original's
    /// processes starting their loop immediately on launch rather than
    /// waiting for an explicit `start`.
    pub fn new() -> Arc<Self> {
        Arc::new(ControlState {
            running: AtomicBool::new(true),
            poll_signal: Notify::new(),
            iteration_done: Notify::new(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Idempotent: returns whether this call actually changed the
    /// state, matching the original's `start`/`stop` return value.
    pub fn start(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }

    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    /// Wakes an idle sleep immediately. Also forces `running = true`,
    /// matching the original's `poll` implicitly restarting a stopped
    /// loop (`self._is_running.set()` inside `poll`).
    pub fn request_poll(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.poll_signal.notify_waiters();
    }

    /// Called by the loop body once per iteration, right as it enters
    /// its idle sleep — this ordering (not at the *end* of the sleep)
    /// is what the original's `_sleep_signal.notify_all()` placement
    /// relies on for `poll(wait=true)` to observe "one full iteration
    /// has completed" rather than racing a newly-started one.
    pub fn mark_iteration_done(&self) {
        self.iteration_done.notify_waiters();
    }

    /// Blocks the loop's own sleep until either `delay` elapses or a
    /// `poll` wakes it, then waits for the running flag to go back up
    /// (mirroring `_is_running.wait()` at the end of the original's
    /// `_sleep`, so a `stop()` issued mid-sleep holds the loop paused
    /// even after the delay or a poll fires).
    pub async fn sleep(&self, delay: Duration) {
        self.mark_iteration_done();
        let woken = self.poll_signal.notified();
        tokio::select! {
            _ = woken => {}
            _ = tokio::time::sleep(delay) => {}
        }
        while !self.is_running() {
            // Cooperative stop: park until `start`/`poll` flips the flag.
            self.poll_signal.notified().await;
        }
    }

    /// Used by `poll(wait=true)`: blocks until the next iteration
    /// finishes, or `timeout` elapses.
    pub async fn wait_for_iteration(&self, timeout: Duration) {
        let notified = self.iteration_done.notified();
        let _ = tokio::time::timeout(timeout, notified).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running_by_default() {
        let state = ControlState::new();
        assert!(state.is_running());
    }

    #[test]
    fn stop_then_start_reports_change() {
        let state = ControlState::new();
        assert!(state.stop());
        assert!(!state.stop());
        assert!(state.start());
        assert!(!state.start());
    }

    #[tokio::test]
    async fn poll_wakes_sleep_before_delay_elapses() {
        let state = ControlState::new();
        let wake = tokio::time::Instant::now();
        let sleeper = tokio::spawn({
            let state = Arc::clone(&state);
            async move { state.sleep(Duration::from_secs(30)).await }
        });
        tokio::task::yield_now().await;
        state.request_poll();
        tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .expect("poll should wake the sleep well before 30s")
            .unwrap();
        assert!(wake.elapsed() < Duration::from_secs(1));
    }
}
