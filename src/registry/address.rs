use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::core::packet::PayloadReader;
use crate::error::{ProtocolError, Result};

/// Service categories tracked by the load balancer.
///
/// `Invalid` doubles as the "not found" marker returned by
/// [`AddressRegistry::get`](super::AddressRegistry::get).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressType {
    #[default]
    Invalid = 0,
    Auth = 1,
    Realm = 2,
    World = 3,
    Instance = 4,
    Chat = 5,
    LoadBalance = 6,
    Region = 7,
}

impl AddressType {
    /// Wire ordinal one past the last storable type.
    pub const COUNT: u8 = 8;

    /// Every type that may be stored in the registry.
    pub const STORABLE: [AddressType; 7] = [
        AddressType::Auth,
        AddressType::Realm,
        AddressType::World,
        AddressType::Instance,
        AddressType::Chat,
        AddressType::LoadBalance,
        AddressType::Region,
    ];

    #[inline]
    pub fn is_storable(self) -> bool {
        self != AddressType::Invalid
    }

    /// Bucket index for storable types.
    pub(crate) fn bucket(self) -> Option<usize> {
        match self {
            AddressType::Invalid => None,
            other => Some(other as usize - 1),
        }
    }
}

impl TryFrom<u8> for AddressType {
    type Error = ProtocolError;

    /// Accepts only storable ordinals; the sentinels are rejected.
    fn try_from(raw: u8) -> Result<Self> {
        let ty = match raw {
            1 => AddressType::Auth,
            2 => AddressType::Realm,
            3 => AddressType::World,
            4 => AddressType::Instance,
            5 => AddressType::Chat,
            6 => AddressType::LoadBalance,
            7 => AddressType::Region,
            _ => return Err(ProtocolError::InvalidAddressType(raw)),
        };
        Ok(ty)
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressType::Invalid => "invalid",
            AddressType::Auth => "auth",
            AddressType::Realm => "realm",
            AddressType::World => "world",
            AddressType::Instance => "instance",
            AddressType::Chat => "chat",
            AddressType::LoadBalance => "loadbalance",
            AddressType::Region => "region",
        };
        f.write_str(name)
    }
}

/// One backend server known to the load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerInformation {
    /// Opaque identity assigned by the load balancer.
    pub entity: u64,
    pub address_type: AddressType,
    pub realm_id: u8,
    /// IPv4 address as a host-order integer.
    pub address: u32,
    pub port: u16,
}

impl ServerInformation {
    /// Encoded size: entity(8) type(1) realm(1) address(4) port(2).
    pub const WIRE_SIZE: usize = 16;

    /// The "not found" record.
    pub const fn invalid() -> Self {
        Self {
            entity: 0,
            address_type: AddressType::Invalid,
            realm_id: 0,
            address: 0,
            port: 0,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.address_type.is_storable()
    }

    pub fn ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.address)
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ipv4(), self.port)
    }

    /// Reads one record, rejecting sentinel address types.
    pub fn read(reader: &mut PayloadReader<'_>) -> Result<Self> {
        let entity = reader.read_u64()?;
        let address_type = AddressType::try_from(reader.read_u8()?)?;
        let realm_id = reader.read_u8()?;
        let address = reader.read_u32()?;
        let port = reader.read_u16()?;

        Ok(Self {
            entity,
            address_type,
            realm_id,
            address,
            port,
        })
    }

    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u64_le(self.entity);
        dst.put_u8(self.address_type as u8);
        dst.put_u8(self.realm_id);
        dst.put_u32_le(self.address);
        dst.put_u16_le(self.port);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_not_parsed() {
        assert!(matches!(
            AddressType::try_from(0),
            Err(ProtocolError::InvalidAddressType(0))
        ));
        assert!(matches!(
            AddressType::try_from(AddressType::COUNT),
            Err(ProtocolError::InvalidAddressType(8))
        ));
        assert_eq!(AddressType::try_from(3).unwrap(), AddressType::World);
    }

    #[test]
    fn record_layout() {
        let info = ServerInformation {
            entity: 0x0102,
            address_type: AddressType::Chat,
            realm_id: 9,
            address: u32::from(Ipv4Addr::new(10, 0, 0, 1)),
            port: 3724,
        };
        let mut buf = BytesMut::new();
        info.write(&mut buf);
        assert_eq!(buf.len(), ServerInformation::WIRE_SIZE);
        assert_eq!(buf[8], AddressType::Chat as u8);

        let mut reader = PayloadReader::new(&buf);
        let decoded = ServerInformation::read(&mut reader).unwrap();
        assert_eq!(decoded.socket_addr().to_string(), "10.0.0.1:3724");
        assert!(!reader.has_remaining());
    }
}
