use crate::core::packet::{Opcode, Packet};
use crate::error::{ProtocolError, Result};
use crate::protocol::ConnectionStatus;
use crate::service::Connection;
use tracing::trace;

/// Handler invoked for a packet that passed every gate.
///
/// An `Err` means the payload was malformed or unauthorized even though the
/// packet itself was well framed.
pub type HandlerFn = fn(&mut Connection, &Packet) -> Result<()>;

/// Acceptance rules and handler for one opcode.
#[derive(Clone, Copy)]
pub struct HandlerDescriptor {
    pub required_status: ConnectionStatus,
    pub min_payload_size: usize,
    pub max_payload_size: usize,
    pub handler: HandlerFn,
}

impl HandlerDescriptor {
    /// Descriptor accepting exactly `payload_size` bytes.
    pub fn new(required_status: ConnectionStatus, payload_size: usize, handler: HandlerFn) -> Self {
        Self::with_range(required_status, payload_size, payload_size, handler)
    }

    /// Descriptor accepting `min..=max` bytes.
    pub fn with_range(
        required_status: ConnectionStatus,
        min_payload_size: usize,
        max_payload_size: usize,
        handler: HandlerFn,
    ) -> Self {
        Self {
            required_status,
            min_payload_size,
            max_payload_size,
            handler,
        }
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("required_status", &self.required_status)
            .field("min_payload_size", &self.min_payload_size)
            .field("max_payload_size", &self.max_payload_size)
            .finish_non_exhaustive()
    }
}

/// Opcode-indexed handler table.
///
/// Built once at startup; every slot is written at most once.
pub struct DispatchTable {
    handlers: [Option<HandlerDescriptor>; Opcode::COUNT],
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self {
            handlers: [None; Opcode::COUNT],
        }
    }

    /// Binds `descriptor` to `opcode`.
    ///
    /// Fails with [`ProtocolError::DuplicateHandler`] if the opcode already
    /// has a handler and with [`ProtocolError::InvalidOpcode`] for the bound
    /// markers.
    pub fn register(&mut self, opcode: Opcode, descriptor: HandlerDescriptor) -> Result<()> {
        if matches!(opcode, Opcode::Invalid | Opcode::MaxCount) {
            return Err(ProtocolError::InvalidOpcode(opcode.as_u16()));
        }

        let slot = &mut self.handlers[opcode.index()];
        if slot.is_some() {
            return Err(ProtocolError::DuplicateHandler(opcode));
        }

        *slot = Some(descriptor);
        Ok(())
    }

    pub fn get(&self, opcode: Opcode) -> Option<&HandlerDescriptor> {
        self.handlers.get(opcode.index()).and_then(Option::as_ref)
    }

    /// Checks every gate for `packet` and runs its handler.
    ///
    /// Any error returned here is fatal to the connection; the caller closes
    /// the transport and stops draining.
    pub fn dispatch(&self, connection: &mut Connection, packet: &Packet) -> Result<()> {
        let opcode = packet.opcode();
        let descriptor = self
            .get(opcode)
            .ok_or(ProtocolError::UnhandledOpcode(opcode))?;

        let status = connection.status();
        if status != descriptor.required_status {
            return Err(ProtocolError::StatusMismatch {
                opcode,
                required: descriptor.required_status,
                actual: status,
            });
        }

        let size = packet.payload.len();
        if size < descriptor.min_payload_size || size > descriptor.max_payload_size {
            return Err(ProtocolError::PayloadSizeOutOfRange {
                opcode,
                size,
                min: descriptor.min_payload_size,
                max: descriptor.max_payload_size,
            });
        }

        trace!(?opcode, size, "Dispatching packet");
        (descriptor.handler)(connection, packet)
    }
}
