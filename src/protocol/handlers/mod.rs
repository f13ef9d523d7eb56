//! Packet handlers for the load-balancer link.
//!
//! Each submodule registers its opcodes into a [`DispatchTable`]; the table is
//! assembled once when a session is built.

pub mod auth;
pub mod general;

use crate::error::Result;
use crate::protocol::dispatcher::DispatchTable;

/// Registers every handler this client understands.
pub fn register_all(table: &mut DispatchTable) -> Result<()> {
    auth::register(table)?;
    general::register(table)?;
    Ok(())
}

/// A table with every handler registered.
pub fn default_table() -> Result<DispatchTable> {
    let mut table = DispatchTable::new();
    register_all(&mut table)?;
    Ok(table)
}
