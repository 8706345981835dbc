//! Connection send worker.
//!
//! Only active when periodic test sends are configured. Each cycle writes
//! one fixed payload in full (bounded wait on writability), then sleeps the
//! configured interval on the shutdown signal so a shutdown request cancels
//! the sleep. Send errors close the shared connection; finding the socket
//! already closed by the receive side is a normal termination, not an
//! error.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use minstant::Instant;

use crate::runtime::worker::WorkerContext;

use super::conn::ConnectionState;

/// Pause between write retries while the socket is not writable.
const WRITE_RETRY: Duration = Duration::from_millis(10);

/// Send loop state for one connection.
pub struct TxThread {
    conn: Arc<ConnectionState>,
    payload: Vec<u8>,
    interval: Duration,
    write_timeout: Duration,
}

impl TxThread {
    /// Creates the send state.
    #[must_use]
    pub fn new(
        conn: Arc<ConnectionState>,
        payload: Vec<u8>,
        interval: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            payload,
            interval,
            write_timeout,
        }
    }

    /// Runs the periodic send loop until shutdown or connection close.
    pub fn run(&mut self, ctx: &WorkerContext) {
        ctx.info(format_args!(
            "send worker started, {} bytes every {} ms",
            self.payload.len(),
            self.interval.as_millis()
        ));

        loop {
            if ctx.shutdown().is_requested() || self.conn.is_closed() {
                break;
            }

            match self.send_payload() {
                Ok(()) => ctx.debug(format_args!("sent {} test bytes", self.payload.len())),
                Err(e) => {
                    if !self.conn.is_closed() {
                        ctx.error(format_args!("send error: {e}"));
                    }
                    self.conn.close();
                    break;
                }
            }

            if ctx.shutdown().wait_timeout(self.interval) {
                break;
            }
        }

        ctx.debug(format_args!("send worker exiting"));
    }

    /// Writes the whole payload, waiting (bounded) whenever the socket is
    /// not writable.
    fn send_payload(&self) -> io::Result<()> {
        let deadline = Instant::now() + self.write_timeout;
        let mut offset = 0;
        while offset < self.payload.len() {
            if self.conn.is_closed() {
                return Err(io::Error::new(
                    ErrorKind::NotConnected,
                    "connection closed during send",
                ));
            }
            match self.conn.socket().try_write(&self.payload[offset..])? {
                Some(n) => offset += n,
                None => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(
                            ErrorKind::TimedOut,
                            "send timed out waiting for writability",
                        ));
                    }
                    std::thread::sleep(WRITE_RETRY);
                }
            }
        }
        Ok(())
    }
}
