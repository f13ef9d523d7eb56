//! Stream framing across arbitrary read boundaries
//!
//! The framer must produce the same packets no matter how the byte stream is
//! chopped up by the transport, and must refuse headers it cannot trust.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use discovery_client::core::framer::{deframe, inbound_queue};
use discovery_client::core::packet::{Opcode, Packet, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use discovery_client::error::ProtocolError;
use proptest::prelude::*;

const FRAMEABLE: [Opcode; 10] = [
    Opcode::ClientLogonChallenge,
    Opcode::ServerLogonChallenge,
    Opcode::ClientLogonHandshake,
    Opcode::ServerLogonHandshake,
    Opcode::ServerConnected,
    Opcode::RequestAddress,
    Opcode::ServerSendAddress,
    Opcode::ServerSendFullServerInfo,
    Opcode::ServerSendAddServerInfo,
    Opcode::ServerSendRemoveServerInfo,
];

fn arb_packet() -> impl Strategy<Value = Packet> {
    (
        prop::sample::select(FRAMEABLE.to_vec()),
        prop::collection::vec(any::<u8>(), 0..300),
    )
        .prop_map(|(opcode, payload)| Packet::new(opcode, payload).unwrap())
}

// Property: splitting the stream at arbitrary points yields the same packets
proptest! {
    #[test]
    fn prop_framing_is_split_resilient(
        packets in prop::collection::vec(arb_packet(), 1..12),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let stream: Vec<u8> = packets.iter().flat_map(Packet::to_bytes).collect();

        let mut boundaries: Vec<usize> = cuts.iter().map(|i| i.index(stream.len() + 1)).collect();
        boundaries.push(0);
        boundaries.push(stream.len());
        boundaries.sort_unstable();
        boundaries.dedup();

        let (tx, mut rx) = inbound_queue();
        let mut buffer = BytesMut::new();
        for window in boundaries.windows(2) {
            buffer.extend_from_slice(&stream[window[0]..window[1]]);
            deframe(&mut buffer, &tx).expect("valid stream must frame");
        }

        let mut framed = Vec::new();
        while let Ok(packet) = rx.try_recv() {
            framed.push(packet);
        }

        prop_assert_eq!(framed, packets);
        prop_assert!(buffer.is_empty());
    }
}

// Property: a partial packet is never emitted and never dropped
proptest! {
    #[test]
    fn prop_partial_packet_is_retained(packet in arb_packet(), keep in any::<prop::sample::Index>()) {
        let bytes = packet.to_bytes();
        let prefix = keep.index(bytes.len());

        let (tx, mut rx) = inbound_queue();
        let mut buffer = BytesMut::from(&bytes[..prefix]);
        let framed = deframe(&mut buffer, &tx).expect("prefix of a valid packet");

        prop_assert_eq!(framed, 0);
        prop_assert!(rx.try_recv().is_err());
        prop_assert_eq!(&buffer[..], &bytes[..prefix]);
    }
}

#[test]
fn header_and_payload_in_separate_reads() {
    let (tx, mut rx) = inbound_queue();
    let mut buffer = BytesMut::new();

    // opcode 6 (MSG_REQUEST_ADDRESS), size 3
    buffer.extend_from_slice(&[0x06, 0x00, 0x03, 0x00]);
    assert_eq!(deframe(&mut buffer, &tx).unwrap(), 0);
    assert_eq!(buffer.len(), HEADER_SIZE);

    buffer.extend_from_slice(&[0x03, 0xAA, 0xBB]);
    assert_eq!(deframe(&mut buffer, &tx).unwrap(), 1);
    assert!(buffer.is_empty());

    let packet = rx.try_recv().unwrap();
    assert_eq!(packet.opcode(), Opcode::RequestAddress);
    assert_eq!(&packet.payload[..], &[0x03, 0xAA, 0xBB]);
}

#[test]
fn zero_length_payload_is_a_packet() {
    let (tx, mut rx) = inbound_queue();
    let mut buffer = BytesMut::from(&[0x05, 0x00, 0x00, 0x00][..]);

    assert_eq!(deframe(&mut buffer, &tx).unwrap(), 1);
    let packet = rx.try_recv().unwrap();
    assert_eq!(packet.opcode(), Opcode::ServerConnected);
    assert!(packet.payload.is_empty());
}

#[test]
fn largest_payload_is_accepted() {
    let packet = Packet::new(Opcode::ServerSendFullServerInfo, vec![0u8; MAX_PAYLOAD_SIZE]).unwrap();
    let (tx, mut rx) = inbound_queue();
    let mut buffer = BytesMut::from(&packet.to_bytes()[..]);

    assert_eq!(deframe(&mut buffer, &tx).unwrap(), 1);
    assert_eq!(rx.try_recv().unwrap().payload.len(), MAX_PAYLOAD_SIZE);
}

#[test]
fn oversized_header_halts_without_consuming() {
    let (tx, mut rx) = inbound_queue();
    // 8193 = 0x2001
    let bytes = [0x05, 0x00, 0x01, 0x20, 0xFF];
    let mut buffer = BytesMut::from(&bytes[..]);

    let err = deframe(&mut buffer, &tx).unwrap_err();
    assert!(matches!(err, ProtocolError::OversizedPacket(8193)));
    assert_eq!(&buffer[..], &bytes[..]);
    assert!(rx.try_recv().is_err());
}

#[test]
fn sentinel_opcodes_are_rejected() {
    for opcode in [0u16, Opcode::MaxCount as u16, 0xFFFF] {
        let (tx, _rx) = inbound_queue();
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&opcode.to_le_bytes());
        buffer.extend_from_slice(&[0x00, 0x00]);

        let err = deframe(&mut buffer, &tx).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidOpcode(op) if op == opcode));
        assert_eq!(buffer.len(), HEADER_SIZE);
    }
}

#[test]
fn packets_before_a_bad_header_are_delivered() {
    let good = Packet::new(Opcode::ServerConnected, Vec::new()).unwrap();
    let mut bytes = good.to_bytes();
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let (tx, mut rx) = inbound_queue();
    let mut buffer = BytesMut::from(&bytes[..]);

    assert!(deframe(&mut buffer, &tx).is_err());
    assert_eq!(rx.try_recv().unwrap(), good);
    assert_eq!(buffer.len(), HEADER_SIZE);
}
