//! Log file routing, rotation, and emission.
//!
//! The sink owns the main application log plus one optional file per worker
//! label. Files are opened lazily on first write and rotated when they
//! cross the configured size threshold. Failure to open a file degrades the
//! affected emission to stderr; a long unbroken run of open failures is
//! fatal, since the process would otherwise be running blind.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use super::entry::LogEntry;

/// Consecutive open failures tolerated before the process exits.
const MAX_OPEN_FAILURES: u32 = 100;

/// Where emitted lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Standard error only.
    Stderr,
    /// Log file only.
    File,
    /// Both file and standard error.
    Both,
}

impl Output {
    /// Parses a configuration value; unknown strings yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr" => Some(Self::Stderr),
            "file" => Some(Self::File),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    const fn to_file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }

    const fn to_stderr(self) -> bool {
        matches!(self, Self::Stderr | Self::Both)
    }
}

/// One log destination: a path and its lazily-opened handle.
struct LogFile {
    /// Worker label this file serves; `None` for the main log.
    label: Option<String>,
    path: PathBuf,
    file: Option<File>,
}

impl LogFile {
    fn new(label: Option<String>, path: PathBuf) -> Self {
        Self {
            label,
            path,
            file: None,
        }
    }
}

/// Routing table plus emission state, guarded by the logger's mutex.
pub struct Sink {
    output: Output,
    rotate_at: u64,
    main: LogFile,
    workers: Vec<LogFile>,
    open_failures: u32,
}

/// Index into the sink's routing table.
enum Target {
    Main,
    Worker(usize),
}

impl Sink {
    /// Creates a sink writing its main log to `path`.
    #[must_use]
    pub fn new(path: PathBuf, rotate_at: u64, output: Output) -> Self {
        Self {
            output,
            rotate_at,
            main: LogFile::new(None, path),
            workers: Vec::new(),
            open_failures: 0,
        }
    }

    /// Registers a dedicated file for a worker label. Replaces any earlier
    /// registration for the same label (case-insensitive).
    pub fn register_worker(&mut self, label: &str, path: PathBuf) {
        if let Some(existing) = self
            .workers
            .iter_mut()
            .find(|f| f.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(label)))
        {
            *existing = LogFile::new(Some(label.to_string()), path);
        } else {
            self.workers
                .push(LogFile::new(Some(label.to_string()), path));
        }
    }

    /// Returns the current output mode.
    #[must_use]
    pub const fn output(&self) -> Output {
        self.output
    }

    /// Switches the output mode for subsequent emissions.
    pub fn set_output(&mut self, output: Output) {
        self.output = output;
    }

    fn route(&self, label: &str) -> Target {
        if !label.is_empty() {
            for (i, f) in self.workers.iter().enumerate() {
                if f.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(label)) {
                    return Target::Worker(i);
                }
            }
        }
        Target::Main
    }

    /// Writes one entry to its routed destination(s).
    ///
    /// File trouble degrades this emission to stderr; the line is never
    /// dropped silently.
    pub fn emit(&mut self, entry: &LogEntry) {
        let mut wrote_file = false;

        if self.output.to_file() {
            let rotate_at = self.rotate_at;
            let (target, open_failures) = match self.route(entry.label.as_str()) {
                Target::Main => (&mut self.main, &mut self.open_failures),
                Target::Worker(i) => (&mut self.workers[i], &mut self.open_failures),
            };

            rotate_if_needed(target, rotate_at);

            if target.file.is_none() {
                match open_log_file(&target.path) {
                    Ok(file) => {
                        target.file = Some(file);
                        *open_failures = 0;
                    }
                    Err(e) => note_open_failure(&target.path, &e, open_failures),
                }
            }

            if let Some(file) = target.file.as_mut() {
                let ok = writeln!(file, "{}", entry.line.as_str())
                    .and_then(|()| file.flush())
                    .is_ok();
                if ok {
                    wrote_file = true;
                } else {
                    // Write failed mid-stream; drop the handle so the next
                    // emission retries the open.
                    target.file = None;
                }
            }
        }

        if self.output.to_stderr() || (self.output.to_file() && !wrote_file) {
            eprintln!("{}", entry.line.as_str());
        }
    }

    /// Closes all file handles. Subsequent emissions reopen lazily.
    pub fn close(&mut self) {
        self.main.file = None;
        for f in &mut self.workers {
            f.file = None;
        }
    }
}

/// Renames a log that crossed its size threshold and clears the handle so
/// the next write reopens a fresh file at the original path.
fn rotate_if_needed(target: &mut LogFile, rotate_at: u64) {
    if rotate_at == 0 {
        return;
    }
    let Ok(meta) = std::fs::metadata(&target.path) else {
        return; // Not created yet; nothing to rotate.
    };
    if meta.len() < rotate_at {
        return;
    }

    target.file = None; // close before rename

    let stamp = Local::now().format("log_%Y-%m-%d.txt");
    let rotated = target
        .path
        .parent()
        .map_or_else(|| PathBuf::from(format!("{stamp}.old")), |dir| {
            dir.join(format!("{stamp}.old"))
        });
    if let Err(e) = std::fs::rename(&target.path, &rotated) {
        // Leave the oversized file in place; emission degrades to stderr
        // only if the reopen also fails.
        eprintln!(
            "failed to rotate log file {}: {e}",
            target.path.display()
        );
    }
}

fn note_open_failure(path: &Path, error: &std::io::Error, open_failures: &mut u32) {
    if *open_failures == 0 {
        eprintln!("failed to open log file {}: {error}", path.display());
    }
    *open_failures += 1;
    if *open_failures >= MAX_OPEN_FAILURES {
        eprintln!(
            "unrecoverable failure to open log file {} after {open_failures} attempts, exiting",
            path.display()
        );
        std::process::exit(1);
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::entry::Level;

    fn entry(label: Option<&str>, line: &str) -> LogEntry {
        LogEntry::new(Level::Info, label, line)
    }

    #[test]
    fn emits_to_main_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.log");
        let mut sink = Sink::new(path.clone(), 0, Output::File);

        sink.emit(&entry(None, "first line"));
        sink.emit(&entry(Some("unknown"), "second line"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "first line\nsecond line\n");
    }

    #[test]
    fn routes_by_label_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = dir.path().join("main.log");
        let client_path = dir.path().join("client.log");
        let mut sink = Sink::new(main_path.clone(), 0, Output::File);
        sink.register_worker("client", client_path.clone());

        sink.emit(&entry(Some("CLIENT"), "to client"));
        sink.emit(&entry(None, "to main"));

        assert_eq!(
            std::fs::read_to_string(&client_path).unwrap(),
            "to client\n"
        );
        assert_eq!(std::fs::read_to_string(&main_path).unwrap(), "to main\n");
    }

    #[test]
    fn rotates_when_threshold_crossed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.log");
        // Tiny threshold: the second emission must rotate first.
        let mut sink = Sink::new(path.clone(), 8, Output::File);

        sink.emit(&entry(None, "0123456789"));
        sink.emit(&entry(None, "after rotation"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "after rotation\n");

        let rotated: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".old"))
            .collect();
        assert_eq!(rotated.len(), 1);
        assert_eq!(
            std::fs::read_to_string(rotated[0].path()).unwrap(),
            "0123456789\n"
        );
    }

    #[test]
    fn reopens_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.log");
        let mut sink = Sink::new(path.clone(), 0, Output::File);

        sink.emit(&entry(None, "one"));
        sink.close();
        sink.emit(&entry(None, "two"));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }
}
