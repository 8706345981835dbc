//! Connection engine.
//!
//! # Architecture
//!
//! One managed worker (the session controller) drives a per-session state
//! machine:
//!
//! ```text
//! DISCONNECTED → (attempt) → CONNECTING → (success) → CONNECTED
//!       ^                                                 │
//!       └──────── (failure on either side, shutdown) ─────┘
//! ```
//!
//! looping until shutdown is requested. Each established connection gets a
//! split thread pair sharing one [`ConnectionState`]:
//! - **receive** (`<label>-rx`): readiness-driven read loop feeding the hex
//!   renderer.
//! - **send** (`<label>-tx`, optional): periodic test-payload writer.
//!
//! The controller waits for both with repeated bounded polls (so shutdown
//! is observed promptly), closes the socket exactly once, and reconnects
//! with exponential backoff unless shutdown was requested. Backoff sleeps
//! wait on the shutdown signal itself, so a shutdown request cancels them.

pub mod backoff;
pub mod conn;
pub mod hex;
pub mod rx_thread;
pub mod tx_thread;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use mio::Interest;

use crate::config::Config;
use crate::net::{Endpoint, Readiness, Socket, TcpSocket, UdpSocket};
use crate::runtime::worker::{Worker, WorkerContext};

use backoff::Backoff;
use conn::ConnectionState;
use rx_thread::RxThread;
use tx_thread::TxThread;

/// Interval between completion polls while a connection's threads run.
const SESSION_POLL: Duration = Duration::from_millis(100);

/// Transport protocol for a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Stream connection with a bounded connect handshake.
    Tcp,
    /// Connected datagram socket; usable immediately.
    Udp,
}

impl Protocol {
    /// Parses a configuration value; unknown strings yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// Settings for one recording session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Bound on the TCP connect handshake.
    pub connect_timeout: Duration,
    /// Bound on each receive readiness wait.
    pub idle_poll: Duration,
    /// Whether the periodic send worker runs.
    pub send_test_data: bool,
    /// Pause between test sends.
    pub send_interval: Duration,
    /// Size of the fixed test payload.
    pub payload_len: usize,
    /// Socket receive buffer size; 0 leaves the OS default.
    pub recv_buffer_size: usize,
    /// Hex row width in 4-byte blocks.
    pub columns: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4200,
            protocol: Protocol::Tcp,
            connect_timeout: Duration::from_secs(5),
            idle_poll: Duration::from_secs(10),
            send_test_data: false,
            send_interval: Duration::from_millis(2000),
            payload_len: 1000,
            recv_buffer_size: 0,
            columns: 1,
        }
    }
}

impl ClientConfig {
    /// Reads the `[network]` and `[recorder]` sections, falling back to the
    /// defaults above for anything missing.
    #[must_use]
    pub fn from_config(cfg: &Config) -> Self {
        let d = Self::default();
        Self {
            host: cfg.get_str("network", "client.server_hostname", &d.host),
            port: cfg.get_int("network", "client.port", i64::from(d.port)) as u16,
            protocol: Protocol::parse(&cfg.get_str("network", "client.protocol", "tcp"))
                .unwrap_or(d.protocol),
            connect_timeout: cfg.get_duration_ms(
                "network",
                "connect_timeout_ms",
                d.connect_timeout,
            ),
            idle_poll: cfg.get_duration_ms("network", "idle_poll_ms", d.idle_poll),
            send_test_data: cfg.get_bool("network", "client.send_test_data", d.send_test_data),
            send_interval: cfg.get_duration_ms(
                "network",
                "client.send_interval_ms",
                d.send_interval,
            ),
            payload_len: cfg.get_int("network", "client.payload_len", d.payload_len as i64).max(1)
                as usize,
            recv_buffer_size: cfg
                .get_int("network", "recv_buffer_size", d.recv_buffer_size as i64)
                .max(0) as usize,
            columns: cfg.get_int("recorder", "columns", d.columns as i64).max(1) as usize,
        }
    }
}

/// The session controller worker.
pub struct ClientWorker {
    cfg: ClientConfig,
}

impl ClientWorker {
    /// Creates a controller with explicit settings.
    #[must_use]
    pub fn new(cfg: ClientConfig) -> Self {
        Self { cfg }
    }

    /// Creates a controller configured from the loaded file.
    #[must_use]
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(ClientConfig::from_config(cfg))
    }

    /// Creates a controller for the given endpoint with default timings.
    #[must_use]
    pub fn connect_and_serve(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self::new(ClientConfig {
            host: host.into(),
            port,
            protocol,
            ..ClientConfig::default()
        })
    }
}

impl Worker for ClientWorker {
    fn run(&mut self, ctx: &WorkerContext) {
        ctx.info(format_args!(
            "will attempt to connect to {}:{} ({})",
            self.cfg.host,
            self.cfg.port,
            self.cfg.protocol.as_str()
        ));

        let mut backoff = Backoff::new();
        loop {
            if ctx.shutdown().is_requested() {
                break;
            }
            let Some(socket) = attempt_connection(ctx, &self.cfg, &mut backoff) else {
                ctx.info(format_args!("shutdown requested before a connection was made"));
                break;
            };
            backoff.reset();
            serve_connection(ctx, &self.cfg, socket);
        }

        ctx.info(format_args!("exiting client worker"));
    }
}

/// Retries connecting with exponential backoff until success or shutdown.
/// Returns `None` once shutdown is requested.
fn attempt_connection(
    ctx: &WorkerContext,
    cfg: &ClientConfig,
    backoff: &mut Backoff,
) -> Option<Socket> {
    loop {
        if ctx.shutdown().is_requested() {
            return None;
        }
        ctx.debug(format_args!(
            "attempting to connect to {}:{}",
            cfg.host, cfg.port
        ));
        match open_socket(ctx, cfg) {
            Ok(socket) => {
                ctx.info(format_args!("connected to {}:{}", cfg.host, cfg.port));
                return Some(socket);
            }
            Err(e) => {
                let delay = backoff.next_delay();
                ctx.error(format_args!(
                    "connection failed: {e}; retrying in {} s",
                    delay.as_secs()
                ));
                // Shutdown-aware sleep: a request cancels the backoff.
                if ctx.shutdown().wait_timeout(delay) {
                    return None;
                }
            }
        }
    }
}

/// Resolves, creates, and (for TCP) connects the session socket.
fn open_socket(ctx: &WorkerContext, cfg: &ClientConfig) -> io::Result<Socket> {
    let endpoint = Endpoint::resolve(&cfg.host, cfg.port)?;
    let socket = match cfg.protocol {
        Protocol::Tcp => Socket::Tcp(TcpSocket::connect_timeout(endpoint, cfg.connect_timeout)?),
        Protocol::Udp => {
            let socket = UdpSocket::connect(endpoint)?;
            ctx.info(format_args!("udp client ready to record from port {}", cfg.port));
            Socket::Udp(socket)
        }
    };
    if cfg.recv_buffer_size > 0
        && let Err(e) = socket.set_recv_buffer_size(cfg.recv_buffer_size)
    {
        ctx.warn(format_args!(
            "failed to set receive buffer to {} bytes: {e}",
            cfg.recv_buffer_size
        ));
    }
    Ok(socket)
}

/// Runs one established connection to completion: spawns the thread pair,
/// polls for their completion at a bound, and closes the socket exactly
/// once.
fn serve_connection(ctx: &WorkerContext, cfg: &ClientConfig, mut socket: Socket) {
    let mut readiness = match Readiness::new() {
        Ok(r) => r,
        Err(e) => {
            ctx.error(format_args!("failed to create poller: {e}"));
            return;
        }
    };
    if let Err(e) = readiness.register(&mut socket, Interest::READABLE) {
        ctx.error(format_args!("failed to register socket for readiness: {e}"));
        return;
    }

    let conn = Arc::new(ConnectionState::new(socket));

    let rx_ctx = ctx.with_label(&format!("{}-rx", ctx.label()));
    let mut rx = RxThread::new(
        Arc::clone(&conn),
        readiness,
        cfg.columns,
        cfg.idle_poll,
    );
    let rx_handle = match std::thread::Builder::new()
        .name(rx_ctx.label().to_string())
        .spawn(move || rx.run(&rx_ctx))
    {
        Ok(h) => h,
        Err(e) => {
            ctx.error(format_args!("failed to spawn receive thread: {e}"));
            conn.close();
            return;
        }
    };

    let tx_handle = if cfg.send_test_data {
        let tx_ctx = ctx.with_label(&format!("{}-tx", ctx.label()));
        let mut tx = TxThread::new(
            Arc::clone(&conn),
            vec![0u8; cfg.payload_len],
            cfg.send_interval,
            cfg.connect_timeout,
        );
        match std::thread::Builder::new()
            .name(tx_ctx.label().to_string())
            .spawn(move || tx.run(&tx_ctx))
        {
            Ok(h) => Some(h),
            Err(e) => {
                ctx.error(format_args!("failed to spawn send thread: {e}"));
                None
            }
        }
    } else {
        None
    };

    // Bounded completion polling so a shutdown request is acted on
    // promptly: closing the socket kicks both threads off their waits.
    loop {
        let rx_done = rx_handle.is_finished();
        let tx_done = tx_handle.as_ref().is_none_or(|h| h.is_finished());
        if rx_done && tx_done {
            break;
        }
        if ctx.shutdown().wait_timeout(SESSION_POLL) {
            conn.close();
        }
    }
    let _ = rx_handle.join();
    if let Some(handle) = tx_handle {
        let _ = handle.join();
    }

    conn.close();
    ctx.info(format_args!("connection to {}:{} closed", cfg.host, cfg.port));
}
