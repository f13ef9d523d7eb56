#![no_main]

use discovery_client::core::packet::PayloadReader;
use discovery_client::protocol::handlers::general::AddressResponse;
use discovery_client::protocol::handshake::KeyExchangeVerifier;
use discovery_client::registry::ServerInformation;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Registry sync payloads
    let mut reader = PayloadReader::new(data);
    while reader.has_remaining() {
        if ServerInformation::read(&mut reader).is_err() {
            break;
        }
    }

    let _ = AddressResponse::parse(data);

    // Logon challenge requests from untrusted peers
    let mut verifier = KeyExchangeVerifier::new();
    if verifier.add_account("loadbalancer", "password").is_ok() {
        let _ = verifier.challenge(data);
    }
});
