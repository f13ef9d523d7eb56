//! Handlers for the server side of the logon handshake.

use tracing::{info, warn};

use crate::core::packet::{Opcode, Packet, PayloadReader};
use crate::error::Result;
use crate::protocol::dispatcher::{DispatchTable, HandlerDescriptor};
use crate::protocol::handshake::{KEY_SIZE, SERVER_CHALLENGE_SIZE};
use crate::protocol::ConnectionStatus;
use crate::service::Connection;
use crate::utils::metrics::global_metrics;

pub fn register(table: &mut DispatchTable) -> Result<()> {
    table.register(
        Opcode::ServerLogonChallenge,
        HandlerDescriptor::new(
            ConnectionStatus::AuthChallenge,
            SERVER_CHALLENGE_SIZE,
            handle_logon_challenge,
        ),
    )?;
    table.register(
        Opcode::ServerLogonHandshake,
        HandlerDescriptor::new(
            ConnectionStatus::AuthChallenge,
            KEY_SIZE,
            handle_logon_handshake,
        ),
    )?;
    Ok(())
}

/// Server sent salt and public value; answer with the client proof.
fn handle_logon_challenge(connection: &mut Connection, packet: &Packet) -> Result<()> {
    let mut reader = PayloadReader::new(&packet.payload);
    let salt: [u8; KEY_SIZE] = reader.read_array()?;
    let server_public: [u8; KEY_SIZE] = reader.read_array()?;

    let proof = connection
        .authenticator_mut()
        .respond(&salt, &server_public)
        .inspect_err(|e| {
            warn!(error = %e, "Failed to answer logon challenge");
            global_metrics().handshake_failed();
        })?;

    let response = Packet::new(Opcode::ClientLogonHandshake, proof)?;
    connection.send(&response)
}

/// Server proved knowledge of the session key.
fn handle_logon_handshake(connection: &mut Connection, packet: &Packet) -> Result<()> {
    if let Err(e) = connection.authenticator_mut().verify(&packet.payload) {
        warn!(error = %e, "Server proof rejected");
        global_metrics().handshake_failed();
        return Err(e);
    }

    connection.set_status(ConnectionStatus::AuthSuccess);
    global_metrics().handshake_success();
    info!("Authenticated with load balancer");
    Ok(())
}
