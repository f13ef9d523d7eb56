//! Stream framing: turns the transport's read buffer into queued packets.
//!
//! The framer is restartable. Whatever it cannot turn into a complete packet
//! stays at the front of the buffer, so the next read appends to it and the
//! next call picks up where this one stopped.

use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{error, trace};

use crate::core::codec::PacketCodec;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};

/// Producer half of the inbound packet queue (read path).
pub type InboundSender = mpsc::UnboundedSender<Packet>;

/// Consumer half of the inbound packet queue (tick).
pub type InboundReceiver = mpsc::UnboundedReceiver<Packet>;

/// Creates the unbounded single-producer/single-consumer inbound queue.
pub fn inbound_queue() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}

/// Extracts every complete packet from `buffer` and pushes it onto `queue`.
///
/// Returns the number of packets queued. On an invalid header the loop halts
/// and the error is returned; the offending bytes are not discarded.
pub fn deframe(buffer: &mut BytesMut, queue: &InboundSender) -> Result<usize> {
    let mut codec = PacketCodec;
    let mut framed = 0;

    loop {
        match codec.decode(buffer) {
            Ok(Some(packet)) => {
                trace!(
                    opcode = ?packet.header.opcode,
                    size = packet.header.size,
                    "Framed packet"
                );
                queue
                    .send(packet)
                    .map_err(|_| ProtocolError::ConnectionClosed)?;
                framed += 1;
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, buffered = buffer.len(), "Invalid packet header in network stream");
                return Err(e);
            }
        }
    }

    Ok(framed)
}
