//! The logging surface and the queue consumer.
//!
//! `Logger::log` renders the full line on the caller's thread, then either
//! enqueues it (once the consumer is live) or writes it synchronously
//! through the sink. The consumer loop runs on the logger worker's thread
//! and is the queue's single draining reader; overflow warnings bypass the
//! queue entirely so a full queue can never recurse into itself.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Local;

use crate::config::Config;
use crate::runtime::shutdown::ShutdownSignal;

use super::entry::{Level, LogEntry};
use super::queue::Ring;
use super::sink::{Output, Sink};

/// Capacity of the log queue.
pub const LOG_QUEUE_CAPACITY: usize = 1024;

/// Idle sleep between consumer drain passes.
const CONSUMER_IDLE: Duration = Duration::from_millis(1);

/// Process-wide logging facility, shared by every worker through its
/// context.
pub struct Logger {
    queue: Ring<LogEntry, LOG_QUEUE_CAPACITY>,
    consumer_live: AtomicBool,
    next_index: AtomicU64,
    min_level: AtomicU8,
    sink: Mutex<Sink>,
}

impl Logger {
    /// Creates a logger writing its main log to `path`.
    #[must_use]
    pub fn new(path: PathBuf, rotate_at: u64, output: Output, min_level: Level) -> Self {
        Self {
            queue: Ring::new(),
            consumer_live: AtomicBool::new(false),
            next_index: AtomicU64::new(0),
            min_level: AtomicU8::new(min_level as u8),
            sink: Mutex::new(Sink::new(path, rotate_at, output)),
        }
    }

    /// Builds a logger from the `[logger]` configuration section.
    ///
    /// Keys: `log_file_path` (directory, default none), `log_file_name`
    /// (default `etherec.log`), `log_file_size` (rotation threshold,
    /// default 10485760), `log_level` (default `debug`), `log_output`
    /// (default `both`).
    #[must_use]
    pub fn from_config(cfg: &Config) -> Self {
        let dir = cfg.get_str("logger", "log_file_path", "");
        let name = cfg.get_str("logger", "log_file_name", "etherec.log");
        let path = if dir.is_empty() {
            PathBuf::from(name)
        } else {
            PathBuf::from(dir).join(name)
        };
        let rotate_at = cfg.get_int("logger", "log_file_size", 10_485_760).max(0) as u64;
        let min_level =
            Level::parse(&cfg.get_str("logger", "log_level", "debug")).unwrap_or(Level::Debug);
        let output =
            Output::parse(&cfg.get_str("logger", "log_output", "both")).unwrap_or(Output::Both);
        Self::new(path, rotate_at, output, min_level)
    }

    /// Registers a dedicated log file for `label` if the configuration
    /// carries a `[logger] <label>.log_file_name` override.
    pub fn register_worker_file(&self, cfg: &Config, label: &str) {
        let key = format!("{label}.log_file_name");
        let name = cfg.get_str("logger", &key, "");
        if name.is_empty() {
            return;
        }
        let dir = cfg.get_str("logger", "log_file_path", "");
        let path = if dir.is_empty() {
            PathBuf::from(name)
        } else {
            PathBuf::from(dir).join(name)
        };
        self.sink.lock().unwrap().register_worker(label, path);
    }

    /// Returns the minimum level that will be emitted.
    #[must_use]
    pub fn level(&self) -> Level {
        Level::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    /// Sets the minimum level for subsequent `log` calls.
    pub fn set_level(&self, level: Level) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    /// Switches the output mode for subsequent emissions.
    pub fn set_output(&self, output: Output) {
        self.sink.lock().unwrap().set_output(output);
    }

    /// Logs one message.
    ///
    /// The line is rendered here (monotonic index, wall-clock timestamp,
    /// level, label) with trailing newlines trimmed. If the consumer is
    /// live the entry is queued (displacing the oldest entries when full,
    /// with a synchronous warning); otherwise it is emitted synchronously.
    pub fn log(&self, level: Level, label: Option<&str>, args: fmt::Arguments<'_>) {
        if level < self.level() {
            return;
        }

        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let message = fmt::format(args);
        let message = message.trim_end_matches(['\n', '\r']);
        let line = format!(
            "{index:010} {timestamp} {}: [{}] {message}",
            level.as_str(),
            label.unwrap_or("main"),
        );
        let entry = LogEntry::new(level, label, &line);

        if self.consumer_live.load(Ordering::Acquire) {
            let displaced = self.queue.push(entry);
            if displaced > 0 {
                self.warn_overflow(displaced);
            }
        } else {
            self.emit_now(&entry);
        }
    }

    /// Emits the queue-overflow warning through the bypass path, forcing
    /// stderr for this single emission and restoring the prior mode under
    /// the sink mutex.
    fn warn_overflow(&self, displaced: usize) {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!(
            "{index:010} {timestamp} {}: [logger] log queue full, discarded {displaced} oldest entr{}",
            Level::Warn.as_str(),
            if displaced == 1 { "y" } else { "ies" },
        );
        let entry = LogEntry::new(Level::Warn, Some("logger"), &line);

        let mut sink = self.sink.lock().unwrap();
        let prior = sink.output();
        sink.set_output(Output::Stderr);
        sink.emit(&entry);
        sink.set_output(prior);
    }

    fn emit_now(&self, entry: &LogEntry) {
        self.sink.lock().unwrap().emit(entry);
    }

    /// Drains the queue to the sink on the calling thread. Returns the
    /// number of entries emitted.
    pub fn drain_pending(&self) -> usize {
        let mut emitted = 0;
        while let Some(entry) = self.queue.pop() {
            self.emit_now(&entry);
            emitted += 1;
        }
        emitted
    }

    /// Runs the consumer loop until shutdown.
    ///
    /// Only the logger worker calls this. The loop drains the queue, idles
    /// briefly, and exits only after the shutdown signal has been observed
    /// *and* one further full drain has completed, so entries logged during
    /// the shutdown race are not lost. On exit the consumer marks itself
    /// not live, returning `log()` to synchronous emission.
    pub fn run_consumer(&self, shutdown: &ShutdownSignal) {
        self.consumer_live.store(true, Ordering::Release);
        loop {
            self.drain_pending();
            if shutdown.is_requested() {
                self.drain_pending();
                break;
            }
            std::thread::sleep(CONSUMER_IDLE);
        }
        self.consumer_live.store(false, Ordering::Release);
    }

    /// Returns `true` if the consumer loop is currently running.
    #[must_use]
    pub fn consumer_live(&self) -> bool {
        self.consumer_live.load(Ordering::Acquire)
    }

    /// Returns `true` if no entries are waiting in the queue.
    #[must_use]
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Closes all log file handles; later emissions reopen lazily.
    pub fn close(&self) {
        self.sink.lock().unwrap().close();
    }

    /// Forces the queued/synchronous path without a consumer thread.
    #[cfg(test)]
    fn set_consumer_live_for_test(&self, live: bool) {
        self.consumer_live.store(live, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_logger(dir: &std::path::Path) -> (Logger, PathBuf) {
        let path = dir.join("main.log");
        (
            Logger::new(path.clone(), 0, Output::File, Level::Debug),
            path,
        )
    }

    #[test]
    fn synchronous_emission_before_consumer_starts() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, path) = file_logger(dir.path());

        logger.log(Level::Info, Some("client"), format_args!("hello {}", 42));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("INFO : [client] hello 42"), "got: {text}");
        // Ten-digit zero-padded index leads the line.
        assert!(text.starts_with("0000000000 "), "got: {text}");
    }

    #[test]
    fn trailing_newlines_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, path) = file_logger(dir.path());

        logger.log(Level::Info, None, format_args!("message\n\n"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("message\n"), "got: {text:?}");
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn level_filter_drops_below_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.log");
        let logger = Logger::new(path.clone(), 0, Output::File, Level::Warn);

        logger.log(Level::Debug, None, format_args!("dropped"));
        logger.log(Level::Info, None, format_args!("dropped too"));
        logger.log(Level::Error, None, format_args!("kept"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("kept"));
    }

    #[test]
    fn index_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, path) = file_logger(dir.path());

        for i in 0..3 {
            logger.log(Level::Info, None, format_args!("msg {i}"));
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let indices: Vec<&str> = text
            .lines()
            .map(|l| l.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(indices, ["0000000000", "0000000001", "0000000002"]);
    }

    #[test]
    fn overflow_discards_oldest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, path) = file_logger(dir.path());

        // Queue path without a consumer: fill the queue, then overflow it.
        logger.set_consumer_live_for_test(true);
        for i in 0..=LOG_QUEUE_CAPACITY {
            logger.log(Level::Info, None, format_args!("entry {i}"));
        }
        logger.set_consumer_live_for_test(false);

        let drained = logger.drain_pending();
        assert_eq!(drained, LOG_QUEUE_CAPACITY);

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        // Entry 0 was displaced; the oldest retained entry is the second
        // pushed one.
        assert!(lines.next().unwrap().ends_with("entry 1"), "got: {text}");
        assert!(
            text.lines().last().unwrap().ends_with(&format!("entry {LOG_QUEUE_CAPACITY}")),
            "got last: {:?}",
            text.lines().last()
        );
    }

    #[test]
    fn consumer_drains_queued_entries_and_exits_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, path) = file_logger(dir.path());
        let logger = std::sync::Arc::new(logger);
        let shutdown = std::sync::Arc::new(ShutdownSignal::new());

        let consumer = {
            let logger = std::sync::Arc::clone(&logger);
            let shutdown = std::sync::Arc::clone(&shutdown);
            std::thread::spawn(move || logger.run_consumer(&shutdown))
        };

        // Wait for the consumer to come live, then log through the queue.
        while !logger.consumer_live() {
            std::thread::sleep(Duration::from_millis(1));
        }
        for i in 0..5 {
            logger.log(Level::Info, Some("worker"), format_args!("queued {i}"));
        }

        shutdown.request();
        consumer.join().unwrap();

        assert!(logger.queue_is_empty());
        let text = std::fs::read_to_string(&path).unwrap();
        for i in 0..5 {
            assert!(text.contains(&format!("queued {i}")), "missing {i}: {text}");
        }
    }
}
