//! In-memory transport.
//!
//! A [`LoopbackTransport`] is paired with a [`LoopbackPeer`] that plays the
//! remote end: it delivers bytes (in whatever chunks it likes), inspects what
//! the client sent and can drop or refuse the connection. The peer half may
//! live on another thread.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::codec::Decoder;

use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::Transport;

#[derive(Debug, Default)]
struct Shared {
    inbound: BytesMut,
    outbound: BytesMut,
    connected: bool,
    refuse: bool,
    connects: usize,
    closes: usize,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Client half of an in-memory pipe.
#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
    read_buffer: BytesMut,
}

/// Remote half of an in-memory pipe.
#[derive(Debug, Clone)]
pub struct LoopbackPeer {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackTransport {
    pub fn pair() -> (LoopbackTransport, LoopbackPeer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            LoopbackTransport {
                shared: shared.clone(),
                read_buffer: BytesMut::new(),
            },
            LoopbackPeer { shared },
        )
    }
}

impl Transport for LoopbackTransport {
    fn connect(&mut self, _host: &str, _port: u16) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.refuse {
            return Err(ProtocolError::TransportError(
                constants::ERR_CONNECT_FAILED.into(),
            ));
        }
        shared.connected = true;
        shared.connects += 1;
        shared.inbound.clear();
        self.read_buffer.clear();
        Ok(())
    }

    fn read(&mut self) -> Result<bool> {
        let mut shared = lock(&self.shared);
        if shared.inbound.is_empty() {
            return Ok(false);
        }
        let chunk = shared.inbound.split();
        self.read_buffer.extend_from_slice(&chunk);
        Ok(true)
    }

    fn read_buffer(&mut self) -> &mut BytesMut {
        &mut self.read_buffer
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut shared = lock(&self.shared);
        if !shared.connected {
            return Err(ProtocolError::TransportError(
                constants::ERR_NOT_CONNECTED.into(),
            ));
        }
        shared.outbound.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = lock(&self.shared);
        if shared.connected {
            shared.connected = false;
            shared.closes += 1;
        }
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

impl LoopbackPeer {
    /// Makes `bytes` readable by the client on its next read.
    pub fn deliver(&self, bytes: &[u8]) {
        lock(&self.shared).inbound.extend_from_slice(bytes);
    }

    /// Delivers a whole packet.
    pub fn deliver_packet(&self, packet: &Packet) {
        self.deliver(&packet.to_bytes());
    }

    /// Takes every byte the client has sent so far.
    pub fn take_sent(&self) -> Vec<u8> {
        lock(&self.shared).outbound.split().to_vec()
    }

    /// Takes and decodes every complete packet the client has sent so far.
    pub fn take_sent_packets(&self) -> Result<Vec<Packet>> {
        let mut shared = lock(&self.shared);
        let mut codec = PacketCodec;
        let mut packets = Vec::new();
        while let Some(packet) = codec.decode(&mut shared.outbound)? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Drops the connection from the remote side.
    pub fn disconnect(&self) {
        lock(&self.shared).connected = false;
    }

    /// Makes subsequent connect attempts fail.
    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.shared).refuse = refuse;
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    /// Number of times the client closed the link itself.
    pub fn close_count(&self) -> usize {
        lock(&self.shared).closes
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.shared).connects
    }
}
