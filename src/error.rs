//! # Error Types
//!
//! Error handling for the discovery client.
//!
//! Every failure in this crate maps to one of two outcomes: the connection is
//! closed, or the connect attempt is abandoned. The variants below are grouped
//! by where they originate.
//!
//! ## Error Categories
//! - **Transport Errors**: connect/read/write failures on the socket
//! - **Framing Errors**: invalid opcode or oversized packet in the byte stream
//! - **Dispatch Errors**: unknown opcode, status mismatch, payload size out of bounds
//! - **Handshake Errors**: ephemeral generation or proof verification failures
//! - **Payload Errors**: truncated or out-of-range fields inside a well-framed packet
//!
//! ## Example Usage
//! ```rust
//! use discovery_client::error::{ProtocolError, Result};
//! use discovery_client::registry::AddressType;
//!
//! fn parse_type(raw: u8) -> Result<AddressType> {
//!     AddressType::try_from(raw)
//! }
//!
//! match parse_type(42) {
//!     Err(ProtocolError::InvalidAddressType(42)) => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

use crate::core::packet::Opcode;
use crate::protocol::ConnectionStatus;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake errors
    pub const ERR_EPHEMERAL_GENERATION: &str = "Failed to generate public ephemeral value";
    pub const ERR_HANDSHAKE_NOT_STARTED: &str = "Handshake was not started";
    pub const ERR_SERVER_CHALLENGE_MISSING: &str = "Server challenge not received";
    pub const ERR_SERVER_PROOF_MISMATCH: &str = "Server proof did not match";
    pub const ERR_CLIENT_PROOF_MISMATCH: &str = "Client proof did not match";
    pub const ERR_INVALID_PUBLIC_VALUE: &str = "Invalid public ephemeral value";
    pub const ERR_MISSING_USERNAME: &str = "Challenge request missing username terminator";
    pub const ERR_UNKNOWN_ACCOUNT: &str = "Unknown account";
    pub const ERR_SALT_GENERATION: &str = "Failed to generate salt";

    /// Connection errors
    pub const ERR_NOT_CONNECTED: &str = "Transport is not connected";
    pub const ERR_CONNECT_FAILED: &str = "Failed to connect";
}

// ProtocolError is the primary error type for all discovery operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u16),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Truncated payload: needed {needed} bytes, {remaining} remaining")]
    TruncatedPayload { needed: usize, remaining: usize },

    #[error("Invalid address type: {0}")]
    InvalidAddressType(u8),

    #[error("No handler registered for {0:?}")]
    UnhandledOpcode(Opcode),

    #[error("Handler for {0:?} registered twice")]
    DuplicateHandler(Opcode),

    #[error("{opcode:?} requires status {required:?}, connection is {actual:?}")]
    StatusMismatch {
        opcode: Opcode,
        required: ConnectionStatus,
        actual: ConnectionStatus,
    },

    #[error("{opcode:?} payload of {size} bytes outside [{min}, {max}]")]
    PayloadSizeOutOfRange {
        opcode: Opcode,
        size: usize,
        min: usize,
        max: usize,
    },

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error came out of the framer rather than dispatch.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidOpcode(_) | ProtocolError::OversizedPacket(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
