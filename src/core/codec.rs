use crate::core::packet::{Packet, PacketHeader, HEADER_SIZE};
use crate::error::ProtocolError;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Length-prefixed packet codec for the load-balancer link.
///
/// Decoding never consumes bytes it cannot turn into a whole packet: a partial
/// header or partial payload returns `Ok(None)`, and an invalid header returns
/// an error with the offending bytes still at the front of `src`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match PacketHeader::peek(src)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let total = HEADER_SIZE + header.size as usize;
        if src.len() < total {
            // Header stays in place until the payload is complete
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(header.size as usize).freeze();

        Ok(Some(Packet { header, payload }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(HEADER_SIZE + item.payload.len());
        item.header.write(dst);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}
