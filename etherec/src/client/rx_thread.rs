//! Connection receive worker.
//!
//! Responsibilities:
//! - Wait for readability with a bounded timeout so the shutdown signal is
//!   observed at finite intervals.
//! - On readiness, drain the socket until it would block, accumulating the
//!   batch in a bounded buffer (rendering early if it fills).
//! - Feed each batch to the hex renderer, framed by `top`/`bottom` lines
//!   carrying the batch byte count.
//! - On peer close or hard error, close the shared connection and exit;
//!   the carried partial row is flushed so every received byte is shown.

use std::sync::Arc;
use std::time::Duration;

use crate::net::{Readiness, Wait};
use crate::runtime::worker::WorkerContext;

use super::conn::ConnectionState;
use super::hex::HexRenderer;

/// Bound on the per-batch accumulation buffer.
pub const RECV_BUFFER_SIZE: usize = 8192;

/// Receive loop state for one connection.
pub struct RxThread {
    conn: Arc<ConnectionState>,
    readiness: Readiness,
    renderer: HexRenderer,
    batch: Vec<u8>,
    idle_poll: Duration,
}

impl RxThread {
    /// Creates the receive state. `readiness` must already have the
    /// connection's socket registered for readable interest.
    #[must_use]
    pub fn new(
        conn: Arc<ConnectionState>,
        readiness: Readiness,
        columns: usize,
        idle_poll: Duration,
    ) -> Self {
        Self {
            conn,
            readiness,
            renderer: HexRenderer::new(columns),
            batch: Vec::with_capacity(RECV_BUFFER_SIZE),
            idle_poll,
        }
    }

    /// Runs the receive loop until shutdown, peer close, or error.
    pub fn run(&mut self, ctx: &WorkerContext) {
        loop {
            if ctx.shutdown().is_requested() {
                ctx.debug(format_args!("shutdown requested, exiting receive loop"));
                break;
            }
            if self.conn.is_closed() {
                break;
            }

            match self.readiness.wait(self.idle_poll) {
                Ok(Wait::TimedOut) => {
                    ctx.debug(format_args!(
                        "no data received within {} ms",
                        self.idle_poll.as_millis()
                    ));
                }
                Ok(Wait::Ready) => {
                    if !self.drain_ready(ctx) {
                        break;
                    }
                }
                Err(e) => {
                    ctx.error(format_args!("readiness wait failed: {e}"));
                    self.conn.close();
                    break;
                }
            }
        }

        // End of stream: show the bytes still carried in the partial row.
        self.renderer
            .flush(&mut |line| ctx.info(format_args!("{line}")));
    }

    /// Reads until the socket would block, rendering the accumulated batch.
    /// Returns `false` when the connection is over.
    fn drain_ready(&mut self, ctx: &WorkerContext) -> bool {
        let mut chunk = [0u8; 2048];
        loop {
            match self.conn.socket().try_read(&mut chunk) {
                Ok(None) => break, // drained for now
                Ok(Some(0)) => {
                    ctx.info(format_args!("peer closed the connection"));
                    self.render_batch(ctx);
                    self.conn.close();
                    return false;
                }
                Ok(Some(n)) => {
                    ctx.debug(format_args!("received {n} bytes"));
                    self.batch.extend_from_slice(&chunk[..n]);
                    if self.batch.len() >= RECV_BUFFER_SIZE {
                        self.render_batch(ctx);
                    }
                }
                Err(e) => {
                    // The other side closing the socket surfaces here as an
                    // error; that is a normal way for the loop to end.
                    if !self.conn.is_closed() {
                        ctx.error(format_args!("recv error: {e}"));
                    }
                    self.render_batch(ctx);
                    self.conn.close();
                    return false;
                }
            }
        }
        self.render_batch(ctx);
        true
    }

    /// Renders the buffered batch as hex rows between framing lines.
    fn render_batch(&mut self, ctx: &WorkerContext) {
        if self.batch.is_empty() {
            return;
        }
        let count = self.batch.len();
        ctx.info(format_args!("{count} bytes received: top"));
        self.renderer
            .push(&self.batch, &mut |line| ctx.info(format_args!("{line}")));
        ctx.info(format_args!("{count} bytes received: bottom"));
        self.batch.clear();
    }
}
