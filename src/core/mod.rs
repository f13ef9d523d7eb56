//! # Core Protocol Components
//!
//! Low-level packet handling: header layout, the tokio codec and the framer
//! that feeds the inbound queue.
//!
//! ## Components
//! - **Packet**: header, opcode space and bounds-checked payload reads
//! - **Codec**: `tokio_util` codec for length-prefixed framing
//! - **Framer**: drains a read buffer into the inbound packet queue
//!
//! ## Wire Format
//! ```text
//! [Opcode(2)] [Size(2)] [Payload(Size)]
//! ```
//!
//! ## Limits
//! - Maximum payload size: 8 KB
//! - Opcodes outside `(Invalid, MaxCount)` are rejected before allocation

pub mod codec;
pub mod framer;
pub mod packet;
