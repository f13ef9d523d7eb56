//! # Protocol Layer
//!
//! Connection state, opcode dispatch, the authentication handshake and the
//! packet handlers that populate the address registry.
//!
//! ## Components
//! - **Dispatcher**: opcode-indexed handler table with status and size gates
//! - **Handshake**: client challenge/proof flow and the key-exchange authenticator
//! - **Handlers**: auth and registry-sync opcodes
//!
//! ## Handshake Flow
//! ```text
//! Client                                  Load balancer
//!   | CMSG_LOGON_CHALLENGE (user, A)  ------->  |
//!   | <-------  SMSG_LOGON_CHALLENGE (salt, B)  |
//!   | CMSG_LOGON_HANDSHAKE (M1)       ------->  |
//!   | <-------  SMSG_LOGON_HANDSHAKE (M2)       |
//!   | <-------  SMSG_CONNECTED                  |
//! ```
//!
//! Registry-sync and address-query opcodes are only accepted once the
//! connection reaches [`ConnectionStatus::Connected`].

pub mod dispatcher;
pub mod handlers;
pub mod handshake;

/// Progress of a connection through the handshake.
///
/// Ordered: a normal handshake only ever moves forward, and only a fresh
/// connect attempt resets it to `NotConnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionStatus {
    #[default]
    NotConnected,
    AuthChallenge,
    AuthSuccess,
    Connected,
}

#[cfg(test)]
mod tests;
