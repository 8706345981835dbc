//! Concurrency runtime: worker lifecycle, shutdown, and the logger worker.
//!
//! - `shutdown`: process-wide one-shot shutdown signal.
//! - `worker`: the lifecycle callback trait and per-worker context.
//! - `supervisor`: registry, thread creation, bounded-join shutdown.
//!
//! [`Runtime`] ties the pieces together: it builds the logger and shutdown
//! signal from configuration, registers the logger worker, and exposes the
//! start/await surface the process entry point drives. Worker startup is
//! ordered around the logger: every other worker's `init` waits on the
//! logger-ready rendezvous before its main body may touch logging-dependent
//! work.

pub mod shutdown;
pub mod supervisor;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::logging::Logger;

use shutdown::ShutdownSignal;
use supervisor::{ShutdownReport, Supervisor, SupervisorError};
use worker::{Worker, WorkerContext, WorkerError};

/// Label of the built-in logger worker.
pub const LOGGER_LABEL: &str = "logger";

/// The assembled recorder runtime.
///
/// Owns the supervisor plus the shared facilities every worker context
/// carries. Construction wires the logger worker in; the caller registers
/// its own workers, starts the pool, and awaits shutdown.
pub struct Runtime {
    config: Arc<Config>,
    logger: Arc<Logger>,
    shutdown: Arc<ShutdownSignal>,
    supervisor: Supervisor,
}

impl Runtime {
    /// Builds a runtime from configuration and registers the logger worker.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let logger = Arc::new(Logger::from_config(&config));
        let shutdown = Arc::new(ShutdownSignal::new());
        let mut supervisor = Supervisor::new(
            Arc::clone(&config),
            Arc::clone(&logger),
            Arc::clone(&shutdown),
        );
        supervisor.register(LOGGER_LABEL, Box::new(LoggerWorker));
        Self {
            config,
            logger,
            shutdown,
            supervisor,
        }
    }

    /// Adds a worker to the startup table.
    pub fn register(&mut self, label: impl Into<String>, worker: Box<dyn Worker>) {
        self.supervisor.register(label, worker);
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The shared logger.
    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// The process-wide shutdown signal.
    #[must_use]
    pub fn shutdown_signal(&self) -> &Arc<ShutdownSignal> {
        &self.shutdown
    }

    /// Applies configured suppression and creates all worker threads.
    ///
    /// # Errors
    ///
    /// Fails on duplicate worker labels or if the OS refuses to create a
    /// thread.
    pub fn start_all(&mut self) -> Result<(), SupervisorError> {
        self.supervisor.apply_suppression();
        self.supervisor.start_all()
    }

    /// Requests process-wide shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.request();
    }

    /// Blocks until shutdown is requested, or until `timeout` elapses when
    /// one is given. Returns `true` if shutdown was observed.
    pub fn await_shutdown_or_timeout(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(t) => self.shutdown.wait_timeout(t),
            None => {
                self.shutdown.wait();
                true
            }
        }
    }

    /// Waits for every worker to terminate, up to `ceiling`, then drains
    /// the log pipeline one final time. See [`Supervisor::await_all`].
    pub fn await_all(&mut self, ceiling: Duration) -> ShutdownReport {
        self.supervisor.await_all(ceiling)
    }

    /// Closes log file handles; call after [`Runtime::await_all`].
    pub fn close_logs(&self) {
        self.logger.close();
    }
}

/// The logger worker: signals readiness, then runs the queue consumer.
struct LoggerWorker;

impl Worker for LoggerWorker {
    // The logger does not wait on itself; its init is immediate.
    fn init(&mut self, ctx: &WorkerContext) -> Result<(), WorkerError> {
        ctx.logger().register_worker_file(ctx.config(), ctx.label());
        Ok(())
    }

    fn run(&mut self, ctx: &WorkerContext) {
        ctx.info(format_args!("logger thread started"));
        ctx.set_logger_ready();
        ctx.logger().run_consumer(ctx.shutdown());
        // Consumer has exited; this emits synchronously.
        ctx.info(format_args!("logger thread shutting down"));
    }
}
