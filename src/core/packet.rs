//! Packet header, opcode space and payload access.
//!
//! Wire layout (little-endian):
//! ```text
//! [Opcode(2)] [Size(2)] [Payload(Size)]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Width of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Hard cap on the payload size a single packet may declare.
pub const MAX_PAYLOAD_SIZE: usize = 8192;

/// Message types understood on the load-balancer link.
///
/// `Invalid` and `MaxCount` bound the opcode space and are never carried by a
/// valid packet.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Invalid = 0,
    ClientLogonChallenge = 1,
    ServerLogonChallenge = 2,
    ClientLogonHandshake = 3,
    ServerLogonHandshake = 4,
    ServerConnected = 5,
    RequestAddress = 6,
    ServerSendAddress = 7,
    ServerSendFullServerInfo = 8,
    ServerSendAddServerInfo = 9,
    ServerSendRemoveServerInfo = 10,
    MaxCount = 11,
}

impl Opcode {
    /// Number of slots in an opcode-indexed table.
    pub const COUNT: usize = Opcode::MaxCount as usize;

    /// Maps a raw ordinal to an opcode inside the open range `(Invalid, MaxCount)`.
    pub fn from_u16(raw: u16) -> Option<Self> {
        let opcode = match raw {
            1 => Opcode::ClientLogonChallenge,
            2 => Opcode::ServerLogonChallenge,
            3 => Opcode::ClientLogonHandshake,
            4 => Opcode::ServerLogonHandshake,
            5 => Opcode::ServerConnected,
            6 => Opcode::RequestAddress,
            7 => Opcode::ServerSendAddress,
            8 => Opcode::ServerSendFullServerInfo,
            9 => Opcode::ServerSendAddServerInfo,
            10 => Opcode::ServerSendRemoveServerInfo,
            _ => return None,
        };
        Some(opcode)
    }

    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u16> for Opcode {
    type Error = ProtocolError;

    fn try_from(raw: u16) -> Result<Self> {
        Opcode::from_u16(raw).ok_or(ProtocolError::InvalidOpcode(raw))
    }
}

/// Fixed-width header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub opcode: Opcode,
    pub size: u16,
}

impl PacketHeader {
    /// Parses and validates a header from the front of `src` without consuming it.
    ///
    /// Returns `Ok(None)` when fewer than [`HEADER_SIZE`] bytes are available.
    pub fn peek(src: &[u8]) -> Result<Option<Self>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let raw_opcode = u16::from_le_bytes([src[0], src[1]]);
        let size = u16::from_le_bytes([src[2], src[3]]);

        let opcode = Opcode::try_from(raw_opcode)?;
        if size as usize > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(size as usize));
        }

        Ok(Some(Self { opcode, size }))
    }

    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.opcode.as_u16());
        dst.put_u16_le(self.size);
    }
}

/// A complete, length-checked packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Builds a packet around `payload`, filling in the header size.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(payload.len()));
        }

        Ok(Self {
            header: PacketHeader {
                opcode,
                size: payload.len() as u16,
            },
            payload,
        })
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Serialize the packet to its wire representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.header.write(&mut out);
        out.extend_from_slice(&self.payload);
        out.to_vec()
    }
}

/// Bounds-checked reads from a packet payload.
///
/// Every handler reads through this so a short payload surfaces as
/// [`ProtocolError::TruncatedPayload`] instead of a panic.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.buf.has_remaining()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::TruncatedPayload {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Reads a NUL-terminated string, consuming the terminator.
    pub fn read_cstr(&mut self) -> Result<&'a str> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .ok_or(ProtocolError::TruncatedPayload {
                needed: self.buf.len() + 1,
                remaining: self.buf.len(),
            })?;
        let text = std::str::from_utf8(&self.buf[..end])
            .map_err(|e| ProtocolError::Custom(format!("Invalid string in payload: {e}")))?;
        self.buf = &self.buf[end + 1..];
        Ok(text)
    }

    /// The unread remainder.
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn opcode_bounds_are_excluded() {
        assert!(Opcode::from_u16(0).is_none());
        assert!(Opcode::from_u16(Opcode::MaxCount.as_u16()).is_none());
        assert_eq!(Opcode::from_u16(6), Some(Opcode::RequestAddress));
    }

    #[test]
    fn header_peek_needs_four_bytes() {
        assert!(PacketHeader::peek(&[6, 0, 1]).unwrap().is_none());
        let header = PacketHeader::peek(&[6, 0, 1, 0]).unwrap().unwrap();
        assert_eq!(header.opcode, Opcode::RequestAddress);
        assert_eq!(header.size, 1);
    }

    #[test]
    fn header_peek_rejects_oversized() {
        let size = (MAX_PAYLOAD_SIZE as u16 + 1).to_le_bytes();
        let result = PacketHeader::peek(&[6, 0, size[0], size[1]]);
        assert!(matches!(result, Err(ProtocolError::OversizedPacket(8193))));
    }

    #[test]
    fn reader_reports_truncation() {
        let mut reader = PayloadReader::new(&[1, 2, 3]);
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert!(matches!(
            reader.read_u32(),
            Err(ProtocolError::TruncatedPayload {
                needed: 4,
                remaining: 1
            })
        ));
    }

    #[test]
    fn reader_cstr() {
        let mut reader = PayloadReader::new(b"loadbalancer\0\x01\x02");
        assert_eq!(reader.read_cstr().unwrap(), "loadbalancer");
        assert_eq!(reader.rest(), &[1, 2]);
    }
}
