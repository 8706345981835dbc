//! Recorder daemon.
//!
//! Loads the configuration, assembles the runtime, and records until
//! shutdown.
//!
//! # Usage
//!
//! ```sh
//! etherec --config config.ini
//! ```
//!
//! The `[app] run_seconds` key bounds the run (0 = until shutdown is
//! requested).

use std::time::Duration;

use etherec::client::ClientWorker;
use etherec::config::{Config, ConfigError};
use etherec::runtime::Runtime;

/// Default configuration file path.
const DEFAULT_CONFIG: &str = "config.ini";

/// Bound on worker termination at shutdown.
const SHUTDOWN_CEILING: Duration = Duration::from_secs(30);

fn main() {
    if let Err(e) = run() {
        eprintln!("etherec: {e}");
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("startup: {0}")]
    Startup(#[from] etherec::runtime::supervisor::SupervisorError),
    #[error("{0}")]
    Usage(String),
}

fn run() -> Result<(), AppError> {
    let config_path = parse_args(&std::env::args().collect::<Vec<_>>())?;

    eprintln!("etherec: loading configuration from {config_path}");
    let config = Config::load(&config_path)?;

    let run_seconds = config.get_int("app", "run_seconds", 0).max(0) as u64;

    let mut runtime = Runtime::new(config);
    let client = ClientWorker::from_config(runtime.config());
    runtime.register("client", Box::new(client));
    runtime.start_all()?;

    eprintln!("etherec: recording");

    let timeout = (run_seconds > 0).then(|| Duration::from_secs(run_seconds));
    runtime.await_shutdown_or_timeout(timeout);
    runtime.request_shutdown();

    eprintln!("etherec: shutting down");
    let report = runtime.await_all(SHUTDOWN_CEILING);
    if !report.stragglers.is_empty() {
        eprintln!(
            "etherec: workers still running at exit: {}",
            report.stragglers.join(", ")
        );
    }
    runtime.close_logs();
    eprintln!("etherec: stopped");
    Ok(())
}

fn parse_args(args: &[String]) -> Result<String, AppError> {
    let mut config_path = DEFAULT_CONFIG.to_string();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    return Err(AppError::Usage("missing value for --config".into()));
                };
                config_path = path.clone();
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => {
                return Err(AppError::Usage(format!("unknown argument: {arg}")));
            }
        }
        i += 1;
    }
    Ok(config_path)
}

fn print_usage() {
    eprintln!(
        r"etherec - network data recorder

USAGE:
    etherec [OPTIONS]

OPTIONS:
    -c, --config <PATH>     Configuration file (default: config.ini)
    -h, --help              Print this help message
"
    );
}
