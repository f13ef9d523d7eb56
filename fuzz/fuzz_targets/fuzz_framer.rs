#![no_main]

use bytes::BytesMut;
use discovery_client::core::framer::{deframe, inbound_queue};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Feed the stream in two reads; framing must never panic or over-read
    let split = data.first().map_or(0, |b| *b as usize).min(data.len());
    let (tx, mut rx) = inbound_queue();
    let mut buffer = BytesMut::new();

    for chunk in [&data[..split], &data[split..]] {
        buffer.extend_from_slice(chunk);
        if deframe(&mut buffer, &tx).is_err() {
            break;
        }
    }

    while let Ok(packet) = rx.try_recv() {
        assert_eq!(packet.payload.len(), packet.header.size as usize);
    }
});
