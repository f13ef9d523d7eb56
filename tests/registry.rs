//! Integration tests for the address registry

#![allow(clippy::unwrap_used)]

use bytes::BytesMut;
use discovery_client::core::packet::PayloadReader;
use discovery_client::registry::{AddressRegistry, AddressType, ServerInformation};
use std::net::{Ipv4Addr, SocketAddrV4};

fn server(address_type: AddressType, entity: u64, realm_id: u8, port: u16) -> ServerInformation {
    ServerInformation {
        entity,
        address_type,
        realm_id,
        address: u32::from(Ipv4Addr::new(10, 0, 0, entity as u8)),
        port,
    }
}

#[test]
fn added_server_is_returned() {
    let mut registry = AddressRegistry::new();
    let world = server(AddressType::World, 7, 1, 8085);
    registry.add(world);

    assert_eq!(registry.get(AddressType::World), world);
    assert_eq!(
        registry.resolve(AddressType::World),
        Some(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 8085))
    );
}

#[test]
fn add_upserts_by_entity() {
    let mut registry = AddressRegistry::new();
    registry.add(server(AddressType::World, 7, 1, 8085));
    registry.add(server(AddressType::World, 7, 1, 9000));

    assert_eq!(registry.len_of(AddressType::World), 1);
    assert_eq!(registry.get(AddressType::World).port, 9000);
}

#[test]
fn add_with_new_realm_overwrites_same_entity() {
    let mut registry = AddressRegistry::new();
    registry.add(server(AddressType::World, 7, 1, 8085));
    registry.add(server(AddressType::World, 7, 2, 8085));

    assert_eq!(registry.len_of(AddressType::World), 1);
    assert_eq!(registry.get(AddressType::World).realm_id, 2);
}

#[test]
fn empty_bucket_yields_invalid_sentinel() {
    let mut registry = AddressRegistry::new();
    registry.add(server(AddressType::Auth, 1, 0, 3724));

    let info = registry.get(AddressType::Chat);
    assert_eq!(info.address_type, AddressType::Invalid);
    assert!(!info.is_valid());
    assert_eq!(registry.try_get(AddressType::Chat), None);
    assert_eq!(registry.resolve(AddressType::Chat), None);
}

#[test]
fn sentinel_types_are_never_stored() {
    let mut registry = AddressRegistry::new();
    registry.add(server(AddressType::Invalid, 1, 0, 1));
    registry.add(ServerInformation::invalid());

    assert!(registry.is_empty());
    assert_eq!(registry.get(AddressType::Invalid).address_type, AddressType::Invalid);
}

#[test]
fn get_rotates_through_bucket() {
    let mut registry = AddressRegistry::new();
    for entity in 1..=3 {
        registry.add(server(AddressType::Instance, entity, 0, 7000 + entity as u16));
    }

    let picked: Vec<u64> = (0..6)
        .map(|_| registry.get(AddressType::Instance).entity)
        .collect();
    assert_eq!(picked, vec![1, 2, 3, 1, 2, 3]);
}

#[test]
fn remove_on_empty_bucket_is_noop() {
    let mut registry = AddressRegistry::new();
    registry.remove(AddressType::World, 7, 1);

    assert_eq!(registry.get(AddressType::World).address_type, AddressType::Invalid);
}

#[test]
fn remove_ignores_other_realms() {
    let mut registry = AddressRegistry::new();
    registry.add(server(AddressType::World, 7, 1, 8085));

    registry.remove(AddressType::World, 7, 3);
    assert_eq!(registry.len_of(AddressType::World), 1);

    registry.remove(AddressType::World, 7, 1);
    assert_eq!(registry.len_of(AddressType::World), 0);
}

#[test]
fn remove_keeps_rotation_fair() {
    let mut registry = AddressRegistry::new();
    for entity in 1..=3 {
        registry.add(server(AddressType::Region, entity, 0, 6000));
    }

    assert_eq!(registry.get(AddressType::Region).entity, 1);
    assert_eq!(registry.get(AddressType::Region).entity, 2);
    registry.remove(AddressType::Region, 2, 0);

    let picked: Vec<u64> = (0..4)
        .map(|_| registry.get(AddressType::Region).entity)
        .collect();
    assert_eq!(picked, vec![3, 1, 3, 1]);
}

#[test]
fn clear_empties_every_bucket() {
    let mut registry = AddressRegistry::new();
    for address_type in AddressType::STORABLE {
        registry.add(server(address_type, 1, 0, 1000));
    }
    assert_eq!(registry.len(), AddressType::STORABLE.len());

    registry.clear();
    assert!(registry.is_empty());
    for address_type in AddressType::STORABLE {
        assert!(!registry.get(address_type).is_valid());
    }
}

#[test]
fn server_information_wire_layout() {
    let info = ServerInformation {
        entity: 0x0102_0304_0506_0708,
        address_type: AddressType::Realm,
        realm_id: 9,
        address: 0x7F00_0001,
        port: 8000,
    };

    let mut buffer = BytesMut::new();
    info.write(&mut buffer);
    assert_eq!(buffer.len(), ServerInformation::WIRE_SIZE);
    assert_eq!(
        &buffer[..],
        &[
            0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, // entity
            0x02, // type
            0x09, // realm
            0x01, 0x00, 0x00, 0x7F, // address
            0x40, 0x1F, // port
        ]
    );

    let mut reader = PayloadReader::new(&buffer);
    assert_eq!(ServerInformation::read(&mut reader).unwrap(), info);
    assert!(!reader.has_remaining());
}
