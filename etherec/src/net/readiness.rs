//! Bounded readiness waits over a mio poll.
//!
//! Every socket wait in the recorder is bounded so the shutdown signal is
//! re-checked at finite intervals. The wait result is tri-state: ready,
//! timed out, or a hard I/O error.

use std::io;
use std::time::Duration;

use minstant::Instant;
use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

/// Outcome of a bounded readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The registered source became ready for the requested interest.
    Ready,
    /// The timeout elapsed with no readiness event.
    TimedOut,
}

/// A reusable bounded-wait poller for a single socket.
///
/// Wraps a [`Poll`] and a small event buffer. One `Readiness` serves one
/// registered source; the receive worker owns one for the lifetime of a
/// connection.
pub struct Readiness {
    poll: Poll,
    events: Events,
}

/// Token used for the single registered source.
const SOURCE: Token = Token(0);

impl Readiness {
    /// Creates a new poller.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS polling handle cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(4),
        })
    }

    /// Registers a source for the given interest.
    ///
    /// # Errors
    ///
    /// Returns an error if registration with the OS poller fails.
    pub fn register<S: Source>(&mut self, source: &mut S, interest: Interest) -> io::Result<()> {
        source.register(self.poll.registry(), SOURCE, interest)
    }

    /// Deregisters a previously registered source.
    ///
    /// # Errors
    ///
    /// Returns an error if deregistration fails.
    pub fn deregister<S: Source>(&mut self, source: &mut S) -> io::Result<()> {
        source.deregister(self.poll.registry())
    }

    /// Waits for the registered source to become ready, up to `timeout`.
    ///
    /// Interrupted waits are resumed with the remaining time.
    ///
    /// # Errors
    ///
    /// Returns an error on poller failure.
    pub fn wait(&mut self, timeout: Duration) -> io::Result<Wait> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            let remaining = if now >= deadline {
                Duration::ZERO
            } else {
                deadline - now
            };
            match self.poll.poll(&mut self.events, Some(remaining)) {
                Ok(()) => {
                    if !self.events.is_empty() {
                        return Ok(Wait::Ready);
                    }
                    // Empty wakeups before the deadline are spurious.
                    if Instant::now() >= deadline {
                        return Ok(Wait::TimedOut);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    if Instant::now() >= deadline {
                        return Ok(Wait::TimedOut);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::UdpSocket;

    #[test]
    fn wait_times_out_without_data() {
        let mut socket =
            UdpSocket::bind("127.0.0.1:0".parse().unwrap()).expect("bind ephemeral");
        let mut readiness = Readiness::new().unwrap();
        readiness.register(&mut socket, Interest::READABLE).unwrap();

        let start = Instant::now();
        let result = readiness.wait(Duration::from_millis(50)).unwrap();
        assert_eq!(result, Wait::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn wait_reports_ready_on_data() {
        let mut receiver =
            UdpSocket::bind("127.0.0.1:0".parse().unwrap()).expect("bind receiver");
        let target = receiver.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).expect("bind sender");

        let mut readiness = Readiness::new().unwrap();
        readiness
            .register(&mut receiver, Interest::READABLE)
            .unwrap();

        sender.send_to(b"ping", target).unwrap();

        let result = readiness.wait(Duration::from_secs(2)).unwrap();
        assert_eq!(result, Wait::Ready);
    }
}
