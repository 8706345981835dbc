//! Network shim: non-blocking sockets and bounded readiness waits.
//!
//! - `endpoint`: address wrapper plus hostname resolution.
//! - `socket`: mio-backed TCP/UDP wrappers with `try_*` send/recv APIs and
//!   connect-with-timeout.
//! - `readiness`: tri-state bounded wait (ready / timed out / error) over a
//!   mio poll, used by the receive worker and the TCP connect path.

pub mod endpoint;
pub mod readiness;
pub mod socket;

pub use endpoint::Endpoint;
pub use readiness::{Readiness, Wait};
pub use socket::{Socket, TcpSocket, UdpSocket};
