//! # Transport Layer
//!
//! The byte pipe underneath the session. The session only needs a handful of
//! non-blocking operations, captured by [`Transport`]:
//!
//! - **TCP**: [`tcp::TcpTransport`], a non-blocking `TCP_NODELAY` socket with fixed buffer sizes
//! - **Loopback**: [`loopback::LoopbackTransport`], an in-memory pipe for tests and embedding

pub mod loopback;
pub mod tcp;

use bytes::BytesMut;
use std::net::SocketAddr;

use crate::error::Result;

/// Default socket send/receive buffer size.
pub const SOCKET_BUFFER_SIZE: usize = 8192;

/// Non-blocking byte transport driven from the tick.
pub trait Transport: Send {
    /// Connects synchronously, discarding any buffered bytes from a previous link.
    fn connect(&mut self, host: &str, port: u16) -> Result<()>;

    /// Pulls whatever is readable into [`read_buffer`](Transport::read_buffer).
    ///
    /// Returns `true` if new bytes arrived. Never blocks.
    fn read(&mut self) -> Result<bool>;

    /// Bytes received but not yet framed.
    fn read_buffer(&mut self) -> &mut BytesMut;

    fn is_connected(&self) -> bool;

    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    fn close(&mut self);

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}
