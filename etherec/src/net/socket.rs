//! Non-blocking socket wrappers for mio-based I/O.
//!
//! Thin wrappers around [`mio::net::TcpStream`] and [`mio::net::UdpSocket`]
//! with `try_*` APIs that fold `WouldBlock` into `Ok(None)`, plus TCP
//! connect-with-timeout. Both are used through [`Socket`], which presents
//! one read/write surface to the connection engine regardless of protocol.

use std::io::{self, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use mio::event::Source;
use mio::net::{TcpStream as MioTcpStream, UdpSocket as MioUdpSocket};
use mio::{Interest, Registry, Token};

use super::readiness::{Readiness, Wait};
use super::Endpoint;

/// A non-blocking TCP stream.
pub struct TcpSocket {
    inner: MioTcpStream,
}

impl TcpSocket {
    /// Connects to `endpoint`, waiting up to `timeout` for the handshake.
    ///
    /// The connect is issued non-blocking, then completion is awaited via a
    /// writable-readiness wait; a pending socket error or an unestablished
    /// peer after the wait is reported as failure.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the handshake does not complete in time, or
    /// the underlying socket error otherwise.
    pub fn connect_timeout(endpoint: Endpoint, timeout: Duration) -> io::Result<Self> {
        let mut stream = MioTcpStream::connect(endpoint.into())?;

        let mut readiness = Readiness::new()?;
        readiness.register(&mut stream, Interest::WRITABLE)?;
        let wait = readiness.wait(timeout)?;
        readiness.deregister(&mut stream)?;

        match wait {
            Wait::TimedOut => Err(io::Error::new(
                ErrorKind::TimedOut,
                format!("connect to {endpoint} timed out"),
            )),
            Wait::Ready => {
                if let Some(e) = stream.take_error()? {
                    return Err(e);
                }
                // A writable event with no pending error still needs the
                // peer address check to distinguish refused connections.
                stream.peer_addr()?;
                Ok(Self { inner: stream })
            }
        }
    }

    /// Attempts to read, returning `Ok(None)` instead of `WouldBlock`.
    ///
    /// `Ok(Some(0))` means the peer performed an orderly shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match (&self.inner).read(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Attempts to write, returning `Ok(None)` instead of `WouldBlock`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn try_write(&self, buf: &[u8]) -> io::Result<Option<usize>> {
        loop {
            match (&self.inner).write(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Shuts down both directions of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown syscall fails.
    pub fn shutdown(&self) -> io::Result<()> {
        self.inner.shutdown(Shutdown::Both)
    }
}

impl AsFd for TcpSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl Source for TcpSocket {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.deregister(registry)
    }
}

/// A non-blocking UDP socket, connected to a single peer.
pub struct UdpSocket {
    inner: MioUdpSocket,
}

impl UdpSocket {
    /// Binds an ephemeral local socket and connects it to `endpoint`.
    ///
    /// UDP needs no handshake; the session is usable immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or connected.
    pub fn connect(endpoint: Endpoint) -> io::Result<Self> {
        let bind = if endpoint.as_socket_addr().is_ipv4() {
            Endpoint::any(0)
        } else {
            Endpoint::new(std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0)
        };
        let inner = MioUdpSocket::bind(bind.into())?;
        inner.connect(endpoint.into())?;
        Ok(Self { inner })
    }

    /// Attempts to receive a datagram, returning `Ok(None)` instead of
    /// `WouldBlock`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match self.inner.recv(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Attempts to send a datagram, returning `Ok(None)` instead of
    /// `WouldBlock`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn try_send(&self, buf: &[u8]) -> io::Result<Option<usize>> {
        loop {
            match self.inner.send(buf) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl AsFd for UdpSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl Source for UdpSocket {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.inner.deregister(registry)
    }
}

/// One established recording socket, TCP or UDP.
pub enum Socket {
    /// A connected TCP stream.
    Tcp(TcpSocket),
    /// A connected UDP socket.
    Udp(UdpSocket),
}

impl Socket {
    /// Attempts to read bytes, folding `WouldBlock` into `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self {
            Self::Tcp(s) => s.try_read(buf),
            Self::Udp(s) => s.try_recv(buf),
        }
    }

    /// Attempts to write bytes, folding `WouldBlock` into `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn try_write(&self, buf: &[u8]) -> io::Result<Option<usize>> {
        match self {
            Self::Tcp(s) => s.try_write(buf),
            Self::Udp(s) => s.try_send(buf),
        }
    }

    /// Shuts down the socket. For UDP this is a no-op; the socket simply
    /// stops being used and is closed on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if a TCP shutdown syscall fails.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.shutdown(),
            Self::Udp(_) => Ok(()),
        }
    }

    /// Sets the socket's receive buffer size, when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        // mio doesn't expose socket options; go through rustix as usual.
        let fd = match self {
            Self::Tcp(s) => s.as_fd(),
            Self::Udp(s) => s.as_fd(),
        };
        rustix::net::sockopt::set_socket_recv_buffer_size(fd, size)?;
        Ok(())
    }
}

impl Source for Socket {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.register(registry, token, interests),
            Self::Udp(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.reregister(registry, token, interests),
            Self::Udp(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.deregister(registry),
            Self::Udp(s) => s.deregister(registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::TcpListener;

    #[test]
    fn tcp_connect_timeout_refused() {
        // Bind a listener to reserve a port, then drop it so connects fail.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpSocket::connect_timeout(Endpoint::from(addr), Duration::from_secs(2));
        assert!(result.is_err());
    }

    #[test]
    fn tcp_connect_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            peer.write_all(b"hello").unwrap();
        });

        let socket =
            TcpSocket::connect_timeout(Endpoint::from(addr), Duration::from_secs(5)).unwrap();

        // Wait for the payload with a bounded readiness poll.
        let mut socket = Socket::Tcp(socket);
        let mut readiness = Readiness::new().unwrap();
        readiness
            .register(&mut socket, Interest::READABLE)
            .unwrap();
        assert_eq!(
            readiness.wait(Duration::from_secs(5)).unwrap(),
            Wait::Ready
        );

        let mut buf = [0u8; 16];
        let n = socket.try_read(&mut buf).unwrap().expect("data ready");
        assert_eq!(&buf[..n], b"hello");

        server.join().unwrap();
    }

    #[test]
    fn udp_connect_send_recv() {
        let peer = MioUdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let socket = UdpSocket::connect(Endpoint::from(peer_addr)).unwrap();
        // Nothing queued yet.
        let mut buf = [0u8; 16];
        assert!(socket.try_recv(&mut buf).unwrap().is_none());
    }
}
