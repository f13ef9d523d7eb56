//! # Discovery Client
//!
//! Client side of a service-discovery link between an internal server node
//! and a load balancer.
//!
//! The node connects over TCP, authenticates with a key-exchange handshake,
//! then receives a live view of which internal servers exist and where they
//! listen. That view is kept in an [`registry::AddressRegistry`] bucketed by
//! server role, and the load balancer may ask the node to resolve a role to
//! an address.
//!
//! ## Layers
//! - **Core**: packet header, codec and stream framer
//! - **Protocol**: connection status, dispatch table, handshake and handlers
//! - **Registry**: per-role server buckets with round-robin selection
//! - **Transport**: non-blocking TCP and an in-memory loopback
//! - **Service**: connection, per-tick session and the engine thread
//!
//! ## Quick Start
//! ```rust,no_run
//! use discovery_client::config::DiscoveryConfig;
//! use discovery_client::service::{Engine, InputMessage};
//!
//! # fn main() -> discovery_client::error::Result<()> {
//! let mut engine = Engine::new(DiscoveryConfig::default())?;
//! engine.start()?;
//! engine.pass_message(InputMessage::Ping);
//! engine.stop();
//! engine.join();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::DiscoveryConfig;
pub use crate::core::packet::{Opcode, Packet};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::ConnectionStatus;
pub use crate::registry::{AddressRegistry, AddressType, ServerInformation};
pub use crate::service::{Engine, Session};
