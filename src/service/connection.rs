use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::{debug, instrument};

use crate::core::codec::PacketCodec;
use crate::core::packet::{Packet, HEADER_SIZE};
use crate::error::Result;
use crate::protocol::handshake::{Authenticator, Credentials};
use crate::protocol::ConnectionStatus;
use crate::registry::AddressRegistry;
use crate::transport::Transport;
use crate::utils::metrics::global_metrics;

/// The state handlers operate on: the link, its handshake progress and the
/// address registry it keeps in sync.
pub struct Connection {
    transport: Box<dyn Transport>,
    status: ConnectionStatus,
    registry: AddressRegistry,
    authenticator: Box<dyn Authenticator>,
    credentials: Credentials,
}

impl Connection {
    pub fn new(
        transport: Box<dyn Transport>,
        authenticator: Box<dyn Authenticator>,
        credentials: Credentials,
    ) -> Self {
        Self {
            transport,
            status: ConnectionStatus::NotConnected,
            registry: AddressRegistry::new(),
            authenticator,
            credentials,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            debug!(from = ?self.status, to = ?status, "Connection status changed");
        }
        self.status = status;
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AddressRegistry {
        &mut self.registry
    }

    pub fn authenticator_mut(&mut self) -> &mut dyn Authenticator {
        self.authenticator.as_mut()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Begins a fresh key exchange, returning the client public value.
    pub fn start_authentication(&mut self) -> Result<Vec<u8>> {
        self.authenticator
            .start(&self.credentials.username, &self.credentials.password)
    }

    /// Encodes and sends a single packet.
    #[instrument(skip(self, packet), fields(opcode = ?packet.header.opcode), level = "trace")]
    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(HEADER_SIZE + packet.payload.len());
        PacketCodec.encode(packet.clone(), &mut buffer)?;
        self.send_bytes(&buffer)?;
        global_metrics().message_sent();
        Ok(())
    }

    /// Sends pre-encoded bytes.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.send(bytes)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("status", &self.status)
            .field("connected", &self.transport.is_connected())
            .field("peer", &self.transport.peer_addr())
            .field("servers", &self.registry.len())
            .field("credentials", &self.credentials)
            .finish()
    }
}
