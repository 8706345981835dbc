//! Worker lifecycle interface and per-worker context.
//!
//! A worker is one named, independently scheduled thread. Its behavior is a
//! closed set of lifecycle callbacks on the [`Worker`] trait:
//!
//! - `before_spawn` / `after_spawn`: around thread creation (`before` on
//!   the supervisor thread, `after` as the new thread's first action).
//! - `init`: gate before the main body; the default waits for the logger
//!   to become ready and registers this worker's log file override. A
//!   failed `init` skips the main body for this worker only.
//! - `run`: the main body.
//! - `exit`: best-effort teardown; failures are logged, never propagated.
//!
//! Every callback receives a [`WorkerContext`] carrying the worker's label,
//! the logger, the shutdown signal, and the configuration; context travels
//! explicitly rather than through thread-locals.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use minstant::Instant;

use crate::config::Config;
use crate::logging::{Level, Logger};

use super::shutdown::ShutdownSignal;

/// Error from a worker lifecycle callback.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The logger-ready rendezvous timed out.
    #[error("timed out waiting for logger readiness")]
    GateTimeout,
    /// Worker-specific initialization failed.
    #[error("initialization failed: {0}")]
    Init(String),
}

/// The logger-ready rendezvous gate.
///
/// Every worker except the logger waits here in its default `init`; the
/// logger sets the gate exactly once when its resources are open, and the
/// broadcast releases all waiters. A worker whose wait times out reports
/// failure from `init` and is skipped; the rest of the system continues.
pub struct ReadyGate {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl ReadyGate {
    /// Creates a gate in the not-ready state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Marks the gate ready and wakes all waiters. Idempotent.
    pub fn set_ready(&self) {
        let mut ready = self.ready.lock().unwrap();
        *ready = true;
        self.cond.notify_all();
    }

    /// Returns `true` once the gate has been set.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap()
    }

    /// Waits for the gate, up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::GateTimeout`] if the gate was not set in time.
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), WorkerError> {
        let deadline = Instant::now() + timeout;
        let mut ready = self.ready.lock().unwrap();
        while !*ready {
            let now = Instant::now();
            if now >= deadline {
                return Err(WorkerError::GateTimeout);
            }
            let (next, _) = self.cond.wait_timeout(ready, deadline - now).unwrap();
            ready = next;
        }
        Ok(())
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-worker context: label plus the shared runtime facilities.
///
/// Cheap to clone (all `Arc`s); connection sub-threads get derived contexts
/// via [`WorkerContext::with_label`].
#[derive(Clone)]
pub struct WorkerContext {
    label: Arc<str>,
    config: Arc<Config>,
    logger: Arc<Logger>,
    shutdown: Arc<ShutdownSignal>,
    gate: Arc<ReadyGate>,
    ready_timeout: Duration,
}

impl WorkerContext {
    pub(crate) fn new(
        label: Arc<str>,
        config: Arc<Config>,
        logger: Arc<Logger>,
        shutdown: Arc<ShutdownSignal>,
        gate: Arc<ReadyGate>,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            label,
            config,
            logger,
            shutdown,
            gate,
            ready_timeout,
        }
    }

    /// The label this context is bound to.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared logger.
    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// The process-wide shutdown signal.
    #[must_use]
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Returns a context identical to this one but bound to `label`, for
    /// threads spawned on a worker's behalf.
    #[must_use]
    pub fn with_label(&self, label: &str) -> Self {
        Self {
            label: Arc::from(label),
            ..self.clone()
        }
    }

    /// Performs the logger-ready rendezvous with this context's timeout.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::GateTimeout`] if the logger never signaled.
    pub fn await_logger_ready(&self) -> Result<(), WorkerError> {
        self.gate.wait_ready(self.ready_timeout)
    }

    /// Signals the logger-ready gate. Called by the logger worker only.
    pub(crate) fn set_logger_ready(&self) {
        self.gate.set_ready();
    }

    /// Logs a message attributed to this worker.
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.logger.log(level, Some(self.label.as_ref()), args);
    }

    /// Logs at DEBUG.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    /// Logs at INFO.
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    /// Logs at WARN.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    /// Logs at ERROR.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }
}

/// Lifecycle callbacks for one worker.
pub trait Worker: Send {
    /// Runs on the supervisor thread immediately before the worker's
    /// thread is created.
    fn before_spawn(&mut self, _ctx: &WorkerContext) {}

    /// Runs as the worker thread's first action, before `init`.
    fn after_spawn(&mut self, _ctx: &WorkerContext) {}

    /// Gates the main body. The default waits for the logger-ready
    /// rendezvous, then registers this worker's configured log file.
    ///
    /// # Errors
    ///
    /// An error here skips `run` for this worker; the failure is logged by
    /// the supervisor machinery and affects no other worker.
    fn init(&mut self, ctx: &WorkerContext) -> Result<(), WorkerError> {
        ctx.await_logger_ready()?;
        ctx.logger().register_worker_file(ctx.config(), ctx.label());
        ctx.info(format_args!("worker {} initialized", ctx.label()));
        Ok(())
    }

    /// The worker's main body.
    fn run(&mut self, ctx: &WorkerContext);

    /// Best-effort teardown after `run` returns.
    fn exit(&mut self, _ctx: &WorkerContext) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_wait_succeeds_after_set() {
        let gate = Arc::new(ReadyGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || gate.wait_ready(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(10));
        gate.set_ready();
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn gate_wait_times_out_when_never_set() {
        let gate = ReadyGate::new();
        let start = Instant::now();
        let result = gate.wait_ready(Duration::from_millis(50));
        assert!(matches!(result, Err(WorkerError::GateTimeout)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn gate_is_sticky() {
        let gate = ReadyGate::new();
        gate.set_ready();
        gate.set_ready();
        assert!(gate.is_ready());
        assert!(gate.wait_ready(Duration::from_millis(1)).is_ok());
    }
}
