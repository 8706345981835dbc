//! Process-wide shutdown signal.
//!
//! A one-shot flag (monotonic false→true, never reset) plus a broadcast
//! condition so any thread can wait for shutdown with a bound. The fast
//! path (`is_requested`) is a single atomic load; the condvar only matters
//! to threads parked in a wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use minstant::Instant;

/// One-shot shutdown flag with a broadcast timed wait.
pub struct ShutdownSignal {
    requested: AtomicBool,
    state: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownSignal {
    /// Creates a signal in the not-requested state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            state: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Requests shutdown and wakes every waiter. Idempotent.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        let mut state = self.state.lock().unwrap();
        *state = true;
        self.cond.notify_all();
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Waits until shutdown is requested or `timeout` elapses.
    ///
    /// Returns `true` if shutdown was observed. Doubles as a
    /// shutdown-aware sleep: backoff and send-interval delays wait here so
    /// a shutdown request cancels them immediately.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while !*state {
            let now = Instant::now();
            if now >= deadline {
                return *state;
            }
            let (next, _timed_out) = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = next;
        }
        true
    }

    /// Waits until shutdown is requested, with no bound.
    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while !*state {
            state = self.cond.wait(state).unwrap();
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_unrequested() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_requested());
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn request_is_observed_by_waiter() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || signal.wait_timeout(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(20));
        signal.request();
        assert!(waiter.join().unwrap());
        assert!(signal.is_requested());
    }

    #[test]
    fn request_is_idempotent_and_sticky() {
        let signal = ShutdownSignal::new();
        signal.request();
        signal.request();
        assert!(signal.is_requested());
        // Already-requested waits return immediately.
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        signal.wait();
    }
}
