//! Shared per-connection state.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::net::Socket;

/// State shared between the send and receive threads of one connection.
///
/// Whichever side detects failure first closes the socket; the flag is a
/// swap-guard so the second closer is a safe no-op. A fresh instance is
/// created for every reconnect cycle; instances are never reused.
pub struct ConnectionState {
    socket: Socket,
    closed: AtomicBool,
}

impl ConnectionState {
    /// Wraps an established socket.
    #[must_use]
    pub fn new(socket: Socket) -> Self {
        Self {
            socket,
            closed: AtomicBool::new(false),
        }
    }

    /// The shared socket.
    #[must_use]
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Returns `true` once either side has closed the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the connection. Returns `true` if this call performed the
    /// close; later calls observe the flag and do nothing.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Shutdown errors are expected when the peer is already gone.
        let _ = self.socket.shutdown();
        true
    }
}
