//! Network endpoint types.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

/// A network endpoint (IP address + port).
///
/// Wrapper around [`SocketAddr`] that provides a stable API for the
/// connection engine, independent of how the address was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Creates a new endpoint from an IP address and port.
    #[must_use]
    pub const fn new(addr: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(addr, port))
    }

    /// Creates a new IPv4 endpoint.
    #[must_use]
    pub const fn new_v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(a, b, c, d),
            port,
        )))
    }

    /// Creates an endpoint bound to all interfaces (0.0.0.0) on the given port.
    #[must_use]
    pub const fn any(port: u16) -> Self {
        Self::new_v4(0, 0, 0, 0, port)
    }

    /// Creates a localhost endpoint on the given port.
    #[must_use]
    pub const fn localhost(port: u16) -> Self {
        Self::new_v4(127, 0, 0, 1, port)
    }

    /// Resolves a hostname and port to an endpoint.
    ///
    /// The first resolved address is used.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution fails or yields no addresses.
    pub fn resolve(host: &str, port: u16) -> io::Result<Self> {
        (host, port)
            .to_socket_addrs()?
            .next()
            .map(Self)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address found for {host}:{port}"),
                )
            })
    }

    /// Returns the IP address.
    #[must_use]
    pub const fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.0.port()
    }

    /// Returns the underlying [`SocketAddr`].
    #[must_use]
    pub const fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        ep.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
