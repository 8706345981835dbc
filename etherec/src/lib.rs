//! Long-running network data recorder.
//!
//! `etherec` keeps a reconnecting socket session to a remote endpoint,
//! ingests the byte stream, and renders it into fixed-width hex rows in
//! rotating, per-worker-routable log files. Everything runs on a small
//! pool of cooperating OS threads whose startup is gated on the logging
//! subsystem becoming ready and whose shutdown is coordinated through one
//! process-wide signal.
//!
//! - [`runtime`]: worker lifecycle, logger-ready rendezvous, shutdown.
//! - [`logging`]: the asynchronous log pipeline (bounded queue, routing,
//!   rotation).
//! - [`client`]: the connection engine (reconnect with backoff, split
//!   send/receive thread pair, hex renderer).
//! - [`net`]: mio-backed socket shims with bounded readiness waits.
//! - [`config`]: INI-style lookups with compiled-in defaults.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use etherec::client::ClientWorker;
//! use etherec::config::Config;
//! use etherec::runtime::Runtime;
//!
//! let config = Config::load("config.ini").expect("readable config");
//! let mut runtime = Runtime::new(config);
//! let client = ClientWorker::from_config(runtime.config());
//! runtime.register("client", Box::new(client));
//! runtime.start_all().expect("worker startup");
//!
//! runtime.await_shutdown_or_timeout(Some(Duration::from_secs(60)));
//! runtime.request_shutdown();
//! runtime.await_all(Duration::from_secs(30));
//! ```

pub mod client;
pub mod config;
pub mod logging;
pub mod net;
pub mod runtime;

pub use client::{ClientConfig, ClientWorker, Protocol};
pub use config::Config;
pub use logging::{Level, Logger, Output};
pub use runtime::worker::{Worker, WorkerContext, WorkerError};
pub use runtime::Runtime;
