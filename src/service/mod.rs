//! # Service Layer
//!
//! - [`Connection`]: transport, status, registry and handshake state handed to handlers
//! - [`Session`]: connect, frame and dispatch on every tick
//! - [`Engine`]: a session on its own fixed-rate thread with message queues

mod connection;
pub mod engine;
pub mod session;

pub use connection::Connection;
pub use engine::{Engine, InputMessage, OutputMessage};
pub use session::{Session, TickOutcome};
