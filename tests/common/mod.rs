//! Shared harness: a session over the loopback transport and a scripted
//! load balancer on the other end.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use discovery_client::core::packet::{Opcode, Packet};
use discovery_client::protocol::handshake::{Credentials, KeyExchangeAuthenticator, KeyExchangeVerifier};
use discovery_client::protocol::ConnectionStatus;
use discovery_client::service::{Connection, Session, TickOutcome};
use discovery_client::transport::loopback::{LoopbackPeer, LoopbackTransport};

pub struct LoadBalancer {
    pub peer: LoopbackPeer,
    pub verifier: KeyExchangeVerifier,
}

impl LoadBalancer {
    pub fn send(&self, opcode: Opcode, payload: impl Into<Vec<u8>>) {
        self.peer
            .deliver_packet(&Packet::new(opcode, payload.into()).unwrap());
    }

    pub fn expect_one(&self, opcode: Opcode) -> Packet {
        let mut sent = self.peer.take_sent_packets().unwrap();
        assert_eq!(sent.len(), 1, "expected exactly one {opcode:?}, got {sent:?}");
        let packet = sent.remove(0);
        assert_eq!(packet.opcode(), opcode);
        packet
    }
}

pub fn session() -> (Session, LoadBalancer) {
    let (transport, peer) = LoopbackTransport::pair();
    let connection = Connection::new(
        Box::new(transport),
        Box::new(KeyExchangeAuthenticator::new()),
        Credentials::default(),
    );
    let session = Session::new(connection).unwrap();

    let mut verifier = KeyExchangeVerifier::new();
    let credentials = Credentials::default();
    verifier
        .add_account(&credentials.username, &credentials.password)
        .unwrap();

    (session, LoadBalancer { peer, verifier })
}

/// Runs the whole handshake until the session reports `Connected`.
pub fn authenticate(session: &mut Session, lb: &mut LoadBalancer) {
    session.connect("loadbalancer.test", 8000).unwrap();
    assert_eq!(session.status(), ConnectionStatus::AuthChallenge);

    let request = lb.expect_one(Opcode::ClientLogonChallenge);
    let challenge = lb.verifier.challenge(&request.payload).unwrap();
    lb.send(Opcode::ServerLogonChallenge, challenge.to_vec());
    assert_eq!(session.tick(), TickOutcome::Dispatched(1));

    let proof = lb.expect_one(Opcode::ClientLogonHandshake);
    let server_proof = lb.verifier.verify_proof(&proof.payload).unwrap();
    lb.send(Opcode::ServerLogonHandshake, server_proof.to_vec());
    assert_eq!(session.tick(), TickOutcome::Dispatched(1));
    assert_eq!(session.status(), ConnectionStatus::AuthSuccess);

    lb.send(Opcode::ServerConnected, Vec::new());
    assert_eq!(session.tick(), TickOutcome::Dispatched(1));
    assert_eq!(session.status(), ConnectionStatus::Connected);
}
