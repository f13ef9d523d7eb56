// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::core::packet::{Opcode, Packet};
use crate::error::ProtocolError;
use crate::protocol::dispatcher::{DispatchTable, HandlerDescriptor};
use crate::protocol::handlers::{self, general};
use crate::protocol::handshake::{Credentials, KeyExchangeAuthenticator};
use crate::protocol::ConnectionStatus;
use crate::registry::{AddressType, ServerInformation};
use crate::service::Connection;
use crate::transport::loopback::{LoopbackPeer, LoopbackTransport};
use crate::transport::Transport;

fn connected() -> (Connection, LoopbackPeer) {
    let (mut transport, peer) = LoopbackTransport::pair();
    transport.connect("loopback", 0).unwrap();
    let connection = Connection::new(
        Box::new(transport),
        Box::new(KeyExchangeAuthenticator::new()),
        Credentials::default(),
    );
    (connection, peer)
}

fn world(entity: u64, port: u16) -> ServerInformation {
    ServerInformation {
        entity,
        address_type: AddressType::World,
        realm_id: 1,
        address: 0x7f00_0001,
        port,
    }
}

fn mark_handled(connection: &mut Connection, _packet: &Packet) -> crate::error::Result<()> {
    connection.registry_mut().add(world(99, 1));
    Ok(())
}

fn table_with_marker(status: ConnectionStatus, min: usize, max: usize) -> DispatchTable {
    let mut table = DispatchTable::new();
    table
        .register(
            Opcode::ServerSendAddServerInfo,
            HandlerDescriptor::with_range(status, min, max, mark_handled),
        )
        .unwrap();
    table
}

#[test]
fn status_gate_rejects_without_running_handler() {
    let (mut connection, _peer) = connected();
    connection.set_status(ConnectionStatus::AuthSuccess);
    let table = table_with_marker(ConnectionStatus::Connected, 0, 16);

    let packet = Packet::new(Opcode::ServerSendAddServerInfo, vec![0u8; 16]).unwrap();
    let err = table.dispatch(&mut connection, &packet).unwrap_err();

    assert!(matches!(
        err,
        ProtocolError::StatusMismatch {
            required: ConnectionStatus::Connected,
            actual: ConnectionStatus::AuthSuccess,
            ..
        }
    ));
    assert!(connection.registry().is_empty());
}

#[test]
fn status_gate_is_exact_not_minimum() {
    let (mut connection, _peer) = connected();
    connection.set_status(ConnectionStatus::Connected);
    let table = table_with_marker(ConnectionStatus::AuthSuccess, 0, 16);

    let packet = Packet::new(Opcode::ServerSendAddServerInfo, Vec::new()).unwrap();
    assert!(table.dispatch(&mut connection, &packet).is_err());
}

#[test]
fn size_gate_bounds_are_inclusive() {
    let (mut connection, _peer) = connected();
    connection.set_status(ConnectionStatus::Connected);
    let table = table_with_marker(ConnectionStatus::Connected, 2, 4);

    for (size, accepted) in [(1, false), (2, true), (4, true), (5, false)] {
        let packet = Packet::new(Opcode::ServerSendAddServerInfo, vec![0u8; size]).unwrap();
        let result = table.dispatch(&mut connection, &packet);
        assert_eq!(result.is_ok(), accepted, "payload of {size} bytes");
        if !accepted {
            assert!(matches!(
                result,
                Err(ProtocolError::PayloadSizeOutOfRange { min: 2, max: 4, .. })
            ));
        }
    }
}

#[test]
fn unregistered_opcode_fails() {
    let (mut connection, _peer) = connected();
    let table = DispatchTable::new();
    let packet = Packet::new(Opcode::ServerConnected, Vec::new()).unwrap();

    assert!(matches!(
        table.dispatch(&mut connection, &packet),
        Err(ProtocolError::UnhandledOpcode(Opcode::ServerConnected))
    ));
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut table = DispatchTable::new();
    let descriptor = HandlerDescriptor::new(ConnectionStatus::Connected, 0, mark_handled);

    table.register(Opcode::ServerConnected, descriptor).unwrap();
    assert!(matches!(
        table.register(Opcode::ServerConnected, descriptor),
        Err(ProtocolError::DuplicateHandler(Opcode::ServerConnected))
    ));
}

#[test]
fn bound_markers_cannot_be_registered() {
    let mut table = DispatchTable::new();
    let descriptor = HandlerDescriptor::new(ConnectionStatus::Connected, 0, mark_handled);

    assert!(table.register(Opcode::Invalid, descriptor).is_err());
    assert!(table.register(Opcode::MaxCount, descriptor).is_err());
}

#[test]
fn default_table_covers_every_server_opcode() {
    let table = handlers::default_table().unwrap();

    for opcode in [
        Opcode::ServerLogonChallenge,
        Opcode::ServerLogonHandshake,
        Opcode::ServerConnected,
        Opcode::RequestAddress,
        Opcode::ServerSendFullServerInfo,
        Opcode::ServerSendAddServerInfo,
        Opcode::ServerSendRemoveServerInfo,
    ] {
        assert!(table.get(opcode).is_some(), "{opcode:?} has no handler");
    }

    assert!(table.get(Opcode::ClientLogonChallenge).is_none());
    assert!(table.get(Opcode::ClientLogonHandshake).is_none());
    assert!(table.get(Opcode::ServerSendAddress).is_none());
}

#[test]
fn connected_notification_advances_status() {
    let (mut connection, _peer) = connected();
    connection.set_status(ConnectionStatus::AuthSuccess);
    let table = handlers::default_table().unwrap();

    let packet = Packet::new(Opcode::ServerConnected, Vec::new()).unwrap();
    table.dispatch(&mut connection, &packet).unwrap();
    assert_eq!(connection.status(), ConnectionStatus::Connected);
}

#[test]
fn address_request_answers_and_echoes() {
    let (mut connection, peer) = connected();
    connection.set_status(ConnectionStatus::Connected);
    connection.registry_mut().add(world(7, 8001));
    let table = handlers::default_table().unwrap();

    let request = general::write_address_request(AddressType::World, &[0xAB, 0xCD]).unwrap();
    table.dispatch(&mut connection, &request).unwrap();

    let sent = peer.take_sent_packets().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].opcode(), Opcode::ServerSendAddress);

    let response = general::AddressResponse::parse(&sent[0].payload).unwrap();
    assert!(response.found);
    assert_eq!(response.port, 8001);
    assert_eq!(response.echo, vec![0xAB, 0xCD]);
}

#[test]
fn address_request_for_empty_bucket_reports_not_found() {
    let (mut connection, peer) = connected();
    connection.set_status(ConnectionStatus::Connected);
    let table = handlers::default_table().unwrap();

    let request = general::write_address_request(AddressType::Region, &[]).unwrap();
    table.dispatch(&mut connection, &request).unwrap();

    let sent = peer.take_sent_packets().unwrap();
    let response = general::AddressResponse::parse(&sent[0].payload).unwrap();
    assert!(!response.found);
    assert_eq!(response.socket_addr(), None);
}

#[test]
fn full_snapshot_with_trailing_bytes_changes_nothing() {
    let (mut connection, _peer) = connected();
    connection.set_status(ConnectionStatus::Connected);
    connection.registry_mut().add(world(1, 9000));
    let table = handlers::default_table().unwrap();

    let mut payload = general::write_full_server_info(&[world(2, 9001), world(3, 9002)])
        .unwrap()
        .payload
        .to_vec();
    payload.extend_from_slice(&[0xFF; 5]);
    let packet = Packet::new(Opcode::ServerSendFullServerInfo, payload).unwrap();

    assert!(table.dispatch(&mut connection, &packet).is_err());
    assert_eq!(connection.registry().len(), 1);
    assert_eq!(connection.registry_mut().get(AddressType::World).entity, 1);
}

#[test]
fn full_snapshot_replaces_registry() {
    let (mut connection, _peer) = connected();
    connection.set_status(ConnectionStatus::Connected);
    connection.registry_mut().add(world(1, 9000));
    let table = handlers::default_table().unwrap();

    let packet = general::write_full_server_info(&[world(2, 9001), world(3, 9002)]).unwrap();
    table.dispatch(&mut connection, &packet).unwrap();

    let entities: Vec<u64> = connection.registry().iter().map(|info| info.entity).collect();
    assert_eq!(entities, vec![2, 3]);
}

#[test]
fn remove_requires_matching_realm() {
    let (mut connection, _peer) = connected();
    connection.set_status(ConnectionStatus::Connected);
    connection.registry_mut().add(world(7, 8001));
    let table = handlers::default_table().unwrap();

    let wrong_realm = general::write_remove_server_info(AddressType::World, 7, 2).unwrap();
    table.dispatch(&mut connection, &wrong_realm).unwrap();
    assert_eq!(connection.registry().len(), 1);

    let matching = general::write_remove_server_info(AddressType::World, 7, 1).unwrap();
    table.dispatch(&mut connection, &matching).unwrap();
    assert!(connection.registry().is_empty());
}
