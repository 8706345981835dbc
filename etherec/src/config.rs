//! INI-style configuration lookups.
//!
//! The recorder reads a flat `section / key / value` file at startup and
//! every component asks for its settings through typed getters that take a
//! compiled-in default. A missing file, section, key, or an unparseable
//! value always yields the default; configuration is never a reason for the
//! process to fail once loading has succeeded.
//!
//! Format accepted:
//!
//! ```ini
//! ; comment
//! # also a comment
//! [network]
//! client.server_hostname = 127.0.0.1
//! client.port = 4200
//! ```
//!
//! Section and key lookups are case-insensitive.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Error loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed configuration: sections of key/value pairs.
///
/// All lookups fall back to the supplied default, so callers never need to
/// handle a missing-key case.
#[derive(Debug, Default, Clone)]
pub struct Config {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    /// Creates an empty configuration; every lookup returns its default.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads configuration from an INI-style file.
    ///
    /// A missing file is not an error: the recorder runs on compiled-in
    /// defaults. Unparseable lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parses configuration from a string.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = name.trim().to_ascii_lowercase();
                sections.entry(current.clone()).or_default();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue; // not a key/value line, skip
            };
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        Self { sections }
    }

    fn raw(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_ascii_lowercase())?
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the string value for `section.key`, or `default`.
    #[must_use]
    pub fn get_str(&self, section: &str, key: &str, default: &str) -> String {
        self.raw(section, key).unwrap_or(default).to_string()
    }

    /// Returns the integer value for `section.key`, or `default` if the key
    /// is missing or not a valid integer.
    #[must_use]
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.raw(section, key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Returns the boolean value for `section.key`, or `default`.
    ///
    /// Accepts `true/false`, `yes/no`, `on/off`, `1/0` (case-insensitive).
    #[must_use]
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.raw(section, key).map(str::to_ascii_lowercase).as_deref() {
            Some("true" | "yes" | "on" | "1") => true,
            Some("false" | "no" | "off" | "0") => false,
            _ => default,
        }
    }

    /// Returns the hexadecimal value for `section.key` (with or without a
    /// `0x` prefix), or `default`.
    #[must_use]
    pub fn get_hex(&self, section: &str, key: &str, default: u64) -> u64 {
        self.raw(section, key)
            .map(|v| v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")).unwrap_or(v))
            .and_then(|v| u64::from_str_radix(v, 16).ok())
            .unwrap_or(default)
    }

    /// Returns a millisecond-valued key as a [`Duration`], or `default`.
    #[must_use]
    pub fn get_duration_ms(&self, section: &str, key: &str, default: Duration) -> Duration {
        self.raw(section, key)
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
; recorder settings
[network]
client.server_hostname = 10.0.0.7
client.port = 4200
client.send_test_data = yes

[Logger]
log_file_size = 1048576
magic = 0xBEEF
";

    #[test]
    fn string_lookup_with_default() {
        let cfg = Config::parse(SAMPLE);
        assert_eq!(
            cfg.get_str("network", "client.server_hostname", "127.0.0.1"),
            "10.0.0.7"
        );
        assert_eq!(cfg.get_str("network", "missing", "fallback"), "fallback");
        assert_eq!(cfg.get_str("nosuch", "key", "fallback"), "fallback");
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let cfg = Config::parse(SAMPLE);
        assert_eq!(cfg.get_int("LOGGER", "LOG_FILE_SIZE", 0), 1_048_576);
    }

    #[test]
    fn int_fallback_on_garbage() {
        let cfg = Config::parse("[a]\nport = not-a-number\n");
        assert_eq!(cfg.get_int("a", "port", 4200), 4200);
    }

    #[test]
    fn bool_spellings() {
        let cfg = Config::parse(SAMPLE);
        assert!(cfg.get_bool("network", "client.send_test_data", false));
        assert!(!cfg.get_bool("network", "missing", false));
    }

    #[test]
    fn hex_with_and_without_prefix() {
        let cfg = Config::parse("[a]\nx = 0xFF\ny = 1a\n");
        assert_eq!(cfg.get_hex("a", "x", 0), 0xFF);
        assert_eq!(cfg.get_hex("a", "y", 0), 0x1A);
        assert_eq!(cfg.get_hex("logger", "magic", 0), 0);
    }

    #[test]
    fn duration_ms() {
        let cfg = Config::parse("[net]\nidle_poll_ms = 250\n");
        assert_eq!(
            cfg.get_duration_ms("net", "idle_poll_ms", Duration::from_secs(10)),
            Duration::from_millis(250)
        );
        assert_eq!(
            cfg.get_duration_ms("net", "missing", Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn missing_file_is_empty_config() {
        let cfg = Config::load("/nonexistent/etherec-test.ini").unwrap();
        assert_eq!(cfg.get_int("a", "b", 7), 7);
    }
}
