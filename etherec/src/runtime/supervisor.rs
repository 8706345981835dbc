//! Worker registry, startup, and orderly shutdown.
//!
//! Responsibilities:
//! - Hold the table of registered workers (label, behavior, suppressed
//!   flag) and reject duplicate labels at `start_all`.
//! - Spawn one named OS thread per non-suppressed worker and drive its
//!   lifecycle callbacks, catching panics at the thread boundary.
//! - At shutdown, wait for all workers with a bounded ceiling, report
//!   stragglers (no forced termination), then drain the log pipeline one
//!   final time so exit-time entries are not lost.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use minstant::Instant;

use crate::config::Config;
use crate::logging::{Level, Logger};

use super::shutdown::ShutdownSignal;
use super::worker::{ReadyGate, Worker, WorkerContext};

/// Default bound on the logger-ready rendezvous.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between join polls in [`Supervisor::await_all`].
const JOIN_POLL: Duration = Duration::from_millis(25);

/// Error starting the worker pool.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Two workers were registered under the same label.
    #[error("duplicate worker label: {0}")]
    DuplicateLabel(String),
    /// The OS refused to create a worker thread.
    #[error("failed to spawn worker thread {label}: {source}")]
    Spawn {
        /// Label of the worker that failed to spawn.
        label: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// `start_all` was called twice.
    #[error("workers already started")]
    AlreadyStarted,
}

/// Outcome of [`Supervisor::await_all`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Labels of workers still running when the ceiling elapsed.
    pub stragglers: Vec<String>,
    /// Entries emitted by the final queue drain.
    pub drained: usize,
}

struct Slot {
    label: Arc<str>,
    suppressed: bool,
    worker: Option<Box<dyn Worker>>,
    handle: Option<JoinHandle<()>>,
}

/// Creates worker threads and owns their handles until joined.
pub struct Supervisor {
    slots: Vec<Slot>,
    config: Arc<Config>,
    logger: Arc<Logger>,
    shutdown: Arc<ShutdownSignal>,
    gate: Arc<ReadyGate>,
    ready_timeout: Duration,
    started: bool,
}

impl Supervisor {
    /// Creates an empty supervisor over the shared runtime facilities.
    ///
    /// The rendezvous bound comes from `[threads] logger_ready_timeout_ms`
    /// (default 5000).
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        logger: Arc<Logger>,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        let ready_timeout = config.get_duration_ms(
            "threads",
            "logger_ready_timeout_ms",
            DEFAULT_READY_TIMEOUT,
        );
        Self {
            slots: Vec::new(),
            config,
            logger,
            shutdown,
            gate: Arc::new(ReadyGate::new()),
            ready_timeout,
            started: false,
        }
    }

    /// Adds a worker to the startup table.
    pub fn register(&mut self, label: impl Into<String>, worker: Box<dyn Worker>) {
        self.slots.push(Slot {
            label: Arc::from(label.into()),
            suppressed: false,
            worker: Some(worker),
            handle: None,
        });
    }

    /// Marks workers named in `[debug] suppress_workers` (comma-separated,
    /// case-insensitive) as excluded from startup.
    pub fn apply_suppression(&mut self) {
        let list = self.config.get_str("debug", "suppress_workers", "");
        for token in list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            for slot in &mut self.slots {
                if slot.label.eq_ignore_ascii_case(token) {
                    slot.suppressed = true;
                }
            }
        }
    }

    /// The logger-ready gate shared with every worker context.
    #[must_use]
    pub fn gate(&self) -> &Arc<ReadyGate> {
        &self.gate
    }

    /// Builds the context handed to a worker's callbacks.
    fn context_for(&self, label: &Arc<str>) -> WorkerContext {
        WorkerContext::new(
            Arc::clone(label),
            Arc::clone(&self.config),
            Arc::clone(&self.logger),
            Arc::clone(&self.shutdown),
            Arc::clone(&self.gate),
            self.ready_timeout,
        )
    }

    /// Creates one OS thread per non-suppressed worker.
    ///
    /// # Errors
    ///
    /// Fails without spawning anything on a duplicate label, and on the
    /// first thread the OS refuses to create.
    pub fn start_all(&mut self) -> Result<(), SupervisorError> {
        if self.started {
            return Err(SupervisorError::AlreadyStarted);
        }

        for (i, a) in self.slots.iter().enumerate() {
            for b in &self.slots[i + 1..] {
                if a.label.eq_ignore_ascii_case(&b.label) {
                    return Err(SupervisorError::DuplicateLabel(a.label.to_string()));
                }
            }
        }
        self.started = true;

        for i in 0..self.slots.len() {
            if self.slots[i].suppressed {
                let label = Arc::clone(&self.slots[i].label);
                self.logger.log(
                    Level::Info,
                    None,
                    format_args!("worker {label} suppressed by configuration"),
                );
                continue;
            }

            let ctx = self.context_for(&self.slots[i].label);
            let mut worker = self.slots[i].worker.take().expect("worker registered once");
            if catch_unwind(AssertUnwindSafe(|| worker.before_spawn(&ctx))).is_err() {
                self.logger.log(
                    Level::Error,
                    None,
                    format_args!(
                        "worker {} panicked in before_spawn, not starting it",
                        self.slots[i].label
                    ),
                );
                continue;
            }

            let label = Arc::clone(&self.slots[i].label);
            let handle = std::thread::Builder::new()
                .name(label.to_string())
                .spawn(move || worker_main(worker, &ctx))
                .map_err(|source| SupervisorError::Spawn {
                    label: label.to_string(),
                    source,
                })?;
            self.slots[i].handle = Some(handle);
        }
        Ok(())
    }

    /// Blocks until every started worker has terminated or `ceiling`
    /// elapses.
    ///
    /// Workers still running at the ceiling are reported by label and left
    /// alone; cancellation is cooperative only. Afterwards the log queue
    /// is drained one final time on this thread.
    pub fn await_all(&mut self, ceiling: Duration) -> ShutdownReport {
        let deadline = Instant::now() + ceiling;

        loop {
            let mut live = 0;
            for slot in &mut self.slots {
                if let Some(handle) = slot.handle.take() {
                    if handle.is_finished() {
                        let _ = handle.join();
                    } else {
                        live += 1;
                        slot.handle = Some(handle);
                    }
                }
            }
            if live == 0 || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(JOIN_POLL);
        }

        let stragglers: Vec<String> = self
            .slots
            .iter()
            .filter(|s| s.handle.is_some())
            .map(|s| s.label.to_string())
            .collect();
        if !stragglers.is_empty() {
            self.logger.log(
                Level::Error,
                None,
                format_args!(
                    "shutdown ceiling elapsed with workers still running: {}",
                    stragglers.join(", ")
                ),
            );
        }

        let drained = self.logger.drain_pending();
        ShutdownReport {
            stragglers,
            drained,
        }
    }
}

/// Drives one worker's lifecycle on its own thread. Panics in any callback
/// are caught here and logged; nothing unwinds into the supervisor.
fn worker_main(mut worker: Box<dyn Worker>, ctx: &WorkerContext) {
    let label = ctx.label().to_string();

    if catch_unwind(AssertUnwindSafe(|| worker.after_spawn(ctx))).is_err() {
        ctx.error(format_args!("worker {label} panicked in after_spawn"));
        return;
    }

    match catch_unwind(AssertUnwindSafe(|| worker.init(ctx))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            ctx.error(format_args!(
                "worker {label} initialization failed, skipping main body: {e}"
            ));
            return;
        }
        Err(_) => {
            ctx.error(format_args!(
                "worker {label} panicked in init, skipping main body"
            ));
            return;
        }
    }

    if catch_unwind(AssertUnwindSafe(|| worker.run(ctx))).is_err() {
        ctx.error(format_args!("worker {label} panicked in main body"));
    }

    if catch_unwind(AssertUnwindSafe(|| worker.exit(ctx))).is_err() {
        ctx.error(format_args!("worker {label} panicked in exit hook"));
    }
}
