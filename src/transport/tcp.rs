use bytes::{Buf, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use tracing::{debug, info, instrument, warn};

use crate::config::TransportConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::Transport;
use crate::utils::metrics::global_metrics;

/// Non-blocking TCP client socket.
///
/// Outgoing bytes that the kernel does not accept immediately are kept in a
/// pending buffer and flushed on the next `send` or `read`.
pub struct TcpTransport {
    config: TransportConfig,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    scratch: Box<[u8]>,
}

impl TcpTransport {
    pub fn new(config: TransportConfig) -> Self {
        let scratch = vec![0u8; config.recv_buffer_size.max(1)].into_boxed_slice();
        Self {
            read_buffer: BytesMut::with_capacity(config.recv_buffer_size),
            write_buffer: BytesMut::new(),
            stream: None,
            peer: None,
            scratch,
            config,
        }
    }

    fn open(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_send_buffer_size(self.config.send_buffer_size)?;
        socket.set_recv_buffer_size(self.config.recv_buffer_size)?;

        match self.config.connect_timeout {
            Some(timeout) => socket.connect_timeout(&addr.into(), timeout)?,
            None => socket.connect(&addr.into())?,
        }
        socket.set_nonblocking(true)?;

        let stream: TcpStream = socket.into();
        stream.set_nodelay(self.config.nodelay)?;
        Ok(stream)
    }

    fn flush_pending(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ProtocolError::TransportError(constants::ERR_NOT_CONNECTED.into()));
        };

        while self.write_buffer.has_remaining() {
            match stream.write(&self.write_buffer) {
                Ok(0) => {
                    self.close();
                    return Err(ProtocolError::ConnectionClosed);
                }
                Ok(written) => {
                    global_metrics().bytes_sent(written as u64);
                    self.write_buffer.advance(written);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Socket write failed");
                    self.close();
                    return Err(e.into());
                }
            }
        }

        if self.write_buffer.is_empty() {
            self.write_buffer.clear();
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    #[instrument(skip(self))]
    fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.close();
        self.read_buffer.clear();
        self.write_buffer.clear();

        let addrs = (host, port).to_socket_addrs().map_err(|e| {
            ProtocolError::TransportError(format!("{}: {e}", constants::ERR_CONNECT_FAILED))
        })?;

        let mut last_error = None;
        for addr in addrs {
            match self.open(addr) {
                Ok(stream) => {
                    info!(peer = %addr, "Connected");
                    self.stream = Some(stream);
                    self.peer = Some(addr);
                    global_metrics().connection_established();
                    return Ok(());
                }
                Err(e) => {
                    debug!(peer = %addr, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        global_metrics().connection_error();
        Err(match last_error {
            Some(e) => ProtocolError::Io(e),
            None => ProtocolError::TransportError(format!(
                "{}: no address for {host}:{port}",
                constants::ERR_CONNECT_FAILED
            )),
        })
    }

    fn read(&mut self) -> Result<bool> {
        if self.stream.is_none() {
            return Ok(false);
        }
        if self.write_buffer.has_remaining() {
            self.flush_pending()?;
        }

        let mut received = false;
        loop {
            let Some(stream) = self.stream.as_mut() else {
                break;
            };
            match stream.read(&mut self.scratch) {
                Ok(0) => {
                    debug!("Peer closed the connection");
                    self.close();
                    break;
                }
                Ok(n) => {
                    global_metrics().bytes_received(n as u64);
                    self.read_buffer.extend_from_slice(&self.scratch[..n]);
                    received = true;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Socket read failed");
                    self.close();
                    return Err(e.into());
                }
            }
        }

        Ok(received)
    }

    fn read_buffer(&mut self) -> &mut BytesMut {
        &mut self.read_buffer
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if self.stream.is_none() {
            return Err(ProtocolError::TransportError(constants::ERR_NOT_CONNECTED.into()));
        }
        self.write_buffer.extend_from_slice(bytes);
        self.flush_pending()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            global_metrics().connection_closed();
            debug!(peer = ?self.peer, "Socket closed");
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connect_send_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new(TransportConfig::default());
        transport.connect("127.0.0.1", port).unwrap();
        assert!(transport.is_connected());

        let (mut server, _) = listener.accept().unwrap();
        transport.send(&[5, 0, 0, 0]).unwrap();

        let mut received = [0u8; 4];
        server.read_exact(&mut received).unwrap();
        assert_eq!(received, [5, 0, 0, 0]);

        server.write_all(&[6, 0, 1, 0, 3]).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while transport.read_buffer().len() < 5 && std::time::Instant::now() < deadline {
            transport.read().unwrap();
        }
        assert_eq!(&transport.read_buffer()[..], &[6, 0, 1, 0, 3]);

        drop(server);
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while transport.is_connected() && std::time::Instant::now() < deadline {
            let _ = transport.read();
        }
        assert!(!transport.is_connected());
    }

    #[test]
    fn connect_refused_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = TcpTransport::new(TransportConfig::default());
        assert!(transport.connect("127.0.0.1", port).is_err());
        assert!(!transport.is_connected());
    }
}
