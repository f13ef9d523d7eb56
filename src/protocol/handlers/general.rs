//! Connection-complete notification, address queries and registry sync.

use bytes::{BufMut, BytesMut};
use tracing::{debug, info};

use crate::core::packet::{Opcode, Packet, PayloadReader, MAX_PAYLOAD_SIZE};
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::{DispatchTable, HandlerDescriptor};
use crate::protocol::ConnectionStatus;
use crate::registry::{AddressType, ServerInformation};
use crate::service::Connection;
use crate::utils::metrics::global_metrics;

/// Largest `MSG_REQUEST_ADDRESS` payload: the type byte plus correlation bytes.
pub const MAX_ADDRESS_REQUEST_SIZE: usize = 128;

/// Payload size of `SMSG_SEND_ADDRESS` before the echoed bytes.
pub const ADDRESS_RESPONSE_HEADER_SIZE: usize = 7;

/// Payload size of `SMSG_SEND_REMOVE_INTERNAL_SERVER_INFO`: entity, type, realm.
pub const REMOVE_SERVER_INFO_SIZE: usize = 10;

pub fn register(table: &mut DispatchTable) -> Result<()> {
    table.register(
        Opcode::ServerConnected,
        HandlerDescriptor::new(ConnectionStatus::AuthSuccess, 0, handle_connected),
    )?;
    table.register(
        Opcode::RequestAddress,
        HandlerDescriptor::with_range(
            ConnectionStatus::Connected,
            1,
            MAX_ADDRESS_REQUEST_SIZE,
            handle_request_address,
        ),
    )?;
    table.register(
        Opcode::ServerSendFullServerInfo,
        HandlerDescriptor::with_range(
            ConnectionStatus::Connected,
            ServerInformation::WIRE_SIZE,
            MAX_PAYLOAD_SIZE,
            handle_full_server_info,
        ),
    )?;
    table.register(
        Opcode::ServerSendAddServerInfo,
        HandlerDescriptor::new(
            ConnectionStatus::Connected,
            ServerInformation::WIRE_SIZE,
            handle_add_server_info,
        ),
    )?;
    table.register(
        Opcode::ServerSendRemoveServerInfo,
        HandlerDescriptor::new(
            ConnectionStatus::Connected,
            REMOVE_SERVER_INFO_SIZE,
            handle_remove_server_info,
        ),
    )?;
    Ok(())
}

fn handle_connected(connection: &mut Connection, _packet: &Packet) -> Result<()> {
    connection.set_status(ConnectionStatus::Connected);
    info!("Load balancer link established");
    Ok(())
}

fn handle_request_address(connection: &mut Connection, packet: &Packet) -> Result<()> {
    let mut reader = PayloadReader::new(&packet.payload);
    let address_type = AddressType::try_from(reader.read_u8()?)?;

    let info = connection.registry_mut().get(address_type);
    let found = info.is_valid();
    if found {
        global_metrics().address_query_served();
    } else {
        global_metrics().address_query_missed();
    }
    debug!(%address_type, found, "Answering address request");

    let response = write_address_response(&info, reader.rest())?;
    connection.send(&response)
}

fn handle_full_server_info(connection: &mut Connection, packet: &Packet) -> Result<()> {
    let mut reader = PayloadReader::new(&packet.payload);
    let mut snapshot = Vec::with_capacity(packet.payload.len() / ServerInformation::WIRE_SIZE);
    while reader.has_remaining() {
        snapshot.push(ServerInformation::read(&mut reader)?);
    }

    // Applied only once the whole snapshot parsed
    let registry = connection.registry_mut();
    registry.clear();
    for info in &snapshot {
        registry.add(*info);
    }

    info!(servers = snapshot.len(), "Applied full server snapshot");
    Ok(())
}

fn handle_add_server_info(connection: &mut Connection, packet: &Packet) -> Result<()> {
    let mut reader = PayloadReader::new(&packet.payload);
    let info = ServerInformation::read(&mut reader)?;

    debug!(entity = info.entity, address_type = %info.address_type, addr = %info.socket_addr(), "Server added");
    connection.registry_mut().add(info);
    Ok(())
}

fn handle_remove_server_info(connection: &mut Connection, packet: &Packet) -> Result<()> {
    let mut reader = PayloadReader::new(&packet.payload);
    let entity = reader.read_u64()?;
    let address_type = AddressType::try_from(reader.read_u8()?)?;
    let realm_id = reader.read_u8()?;

    connection
        .registry_mut()
        .remove(address_type, entity, realm_id);
    Ok(())
}

/// Builds an `SMSG_SEND_ADDRESS` packet for `info`, echoing `echo` back.
pub fn write_address_response(info: &ServerInformation, echo: &[u8]) -> Result<Packet> {
    let mut payload = BytesMut::with_capacity(ADDRESS_RESPONSE_HEADER_SIZE + echo.len());
    payload.put_u8(u8::from(info.is_valid()));
    payload.put_u32_le(info.address);
    payload.put_u16_le(info.port);
    payload.put_slice(echo);

    Packet::new(Opcode::ServerSendAddress, payload.freeze())
}

/// Builds a `MSG_REQUEST_ADDRESS` packet carrying `echo` for correlation.
pub fn write_address_request(address_type: AddressType, echo: &[u8]) -> Result<Packet> {
    if !address_type.is_storable() {
        return Err(ProtocolError::InvalidAddressType(address_type as u8));
    }
    if 1 + echo.len() > MAX_ADDRESS_REQUEST_SIZE {
        return Err(ProtocolError::OversizedPacket(1 + echo.len()));
    }

    let mut payload = BytesMut::with_capacity(1 + echo.len());
    payload.put_u8(address_type as u8);
    payload.put_slice(echo);

    Packet::new(Opcode::RequestAddress, payload.freeze())
}

/// Decoded `SMSG_SEND_ADDRESS` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressResponse {
    pub found: bool,
    pub address: u32,
    pub port: u16,
    pub echo: Vec<u8>,
}

impl AddressResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        let found = reader.read_u8()? != 0;
        let address = reader.read_u32()?;
        let port = reader.read_u16()?;

        Ok(Self {
            found,
            address,
            port,
            echo: reader.rest().to_vec(),
        })
    }

    pub fn socket_addr(&self) -> Option<std::net::SocketAddrV4> {
        self.found
            .then(|| std::net::SocketAddrV4::new(self.address.into(), self.port))
    }
}

/// Builds an `SMSG_SEND_FULL_INTERNAL_SERVER_INFO` packet.
pub fn write_full_server_info(servers: &[ServerInformation]) -> Result<Packet> {
    let mut payload = BytesMut::with_capacity(servers.len() * ServerInformation::WIRE_SIZE);
    for info in servers {
        info.write(&mut payload);
    }
    Packet::new(Opcode::ServerSendFullServerInfo, payload.freeze())
}

/// Builds an `SMSG_SEND_ADD_INTERNAL_SERVER_INFO` packet.
pub fn write_add_server_info(info: &ServerInformation) -> Result<Packet> {
    let mut payload = BytesMut::with_capacity(ServerInformation::WIRE_SIZE);
    info.write(&mut payload);
    Packet::new(Opcode::ServerSendAddServerInfo, payload.freeze())
}

/// Builds an `SMSG_SEND_REMOVE_INTERNAL_SERVER_INFO` packet.
pub fn write_remove_server_info(
    address_type: AddressType,
    entity: u64,
    realm_id: u8,
) -> Result<Packet> {
    let mut payload = BytesMut::with_capacity(REMOVE_SERVER_INFO_SIZE);
    payload.put_u64_le(entity);
    payload.put_u8(address_type as u8);
    payload.put_u8(realm_id);
    Packet::new(Opcode::ServerSendRemoveServerInfo, payload.freeze())
}
