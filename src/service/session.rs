use tracing::{debug, info, instrument, trace, warn};

use crate::core::framer::{deframe, inbound_queue, InboundReceiver, InboundSender};
use crate::error::Result;
use crate::protocol::dispatcher::DispatchTable;
use crate::protocol::handlers;
use crate::protocol::handshake;
use crate::protocol::ConnectionStatus;
use crate::registry::AddressRegistry;
use crate::service::Connection;
use crate::utils::metrics::{global_metrics, Timer};

/// What a single [`Session::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not connected and the loss was already reported.
    Idle,
    /// The link went away; the disconnect notification fired this tick.
    Disconnected,
    /// Every queued packet was dispatched.
    Dispatched(usize),
    /// A packet failed dispatch after the given number succeeded; the
    /// connection was closed and the rest of the queue left behind.
    Aborted(usize),
}

type DisconnectHandler = Box<dyn FnMut() + Send>;

/// One connection to the load balancer, driven from a single thread.
///
/// Each tick reads the transport, frames complete packets onto the inbound
/// queue and drains that queue through the dispatch table.
pub struct Session {
    connection: Connection,
    dispatch: DispatchTable,
    inbound_tx: InboundSender,
    inbound_rx: InboundReceiver,
    disconnect_handled: bool,
    close_on_framing_error: bool,
    on_disconnect: Option<DisconnectHandler>,
}

impl Session {
    /// A session with every built-in handler registered.
    pub fn new(connection: Connection) -> Result<Self> {
        Ok(Self::with_dispatch(connection, handlers::default_table()?))
    }

    pub fn with_dispatch(connection: Connection, dispatch: DispatchTable) -> Self {
        let (inbound_tx, inbound_rx) = inbound_queue();
        Self {
            connection,
            dispatch,
            inbound_tx,
            inbound_rx,
            disconnect_handled: false,
            close_on_framing_error: true,
            on_disconnect: None,
        }
    }

    /// Whether an invalid header closes the link or just stalls the framer.
    pub fn close_on_framing_error(mut self, close: bool) -> Self {
        self.close_on_framing_error = close;
        self
    }

    /// Called once each time the link is lost.
    pub fn set_disconnect_handler(&mut self, handler: impl FnMut() + Send + 'static) {
        self.on_disconnect = Some(Box::new(handler));
    }

    /// Connects the transport and starts the handshake.
    ///
    /// A failed attempt is reported only through the returned error; the
    /// following ticks stay [`TickOutcome::Idle`].
    #[instrument(skip(self))]
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        let _timer = Timer::start("connect");
        self.connection.set_status(ConnectionStatus::NotConnected);
        if let Err(e) = self.connection.transport_mut().connect(host, port) {
            self.disconnect_handled = true;
            return Err(e);
        }
        self.handle_connect()
    }

    fn handle_connect(&mut self) -> Result<()> {
        self.disconnect_handled = false;

        let mut stale = 0usize;
        while self.inbound_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "Dropped packets left from the previous link");
        }

        if let Err(e) = handshake::start_handshake(&mut self.connection) {
            warn!(error = %e, "Handshake could not start, closing connection");
            self.connection.close();
            self.connection.set_status(ConnectionStatus::NotConnected);
            // Reported through the connect error, not as a lost link
            self.disconnect_handled = true;
            return Err(e);
        }
        Ok(())
    }

    fn handle_disconnect(&mut self) {
        self.disconnect_handled = true;
        self.connection.set_status(ConnectionStatus::NotConnected);
        info!("Disconnected from load balancer");

        if let Some(handler) = self.on_disconnect.as_mut() {
            handler();
        }
    }

    /// Runs one iteration of the drive loop.
    pub fn tick(&mut self) -> TickOutcome {
        self.pump_inbound();

        if !self.connection.is_connected() {
            if self.disconnect_handled {
                return TickOutcome::Idle;
            }
            self.handle_disconnect();
            return TickOutcome::Disconnected;
        }

        self.drain_inbound()
    }

    fn pump_inbound(&mut self) {
        match self.connection.transport_mut().read() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                debug!(error = %e, "Transport read failed");
                return;
            }
        }

        let buffer = self.connection.transport_mut().read_buffer();
        match deframe(buffer, &self.inbound_tx) {
            Ok(0) => {}
            Ok(framed) => {
                trace!(framed, "Framed packets");
                global_metrics().packets_framed(framed as u64);
            }
            Err(e) => {
                global_metrics().framing_error();
                if self.close_on_framing_error && e.is_framing() {
                    warn!(error = %e, "Closing connection after framing error");
                    self.connection.close();
                }
            }
        }
    }

    fn drain_inbound(&mut self) -> TickOutcome {
        let mut dispatched = 0;

        while let Ok(packet) = self.inbound_rx.try_recv() {
            if let Err(e) = self.dispatch.dispatch(&mut self.connection, &packet) {
                global_metrics().dispatch_failure();
                warn!(
                    opcode = ?packet.opcode(),
                    size = packet.header.size,
                    status = ?self.connection.status(),
                    error = %e,
                    "Packet rejected, closing connection"
                );
                self.connection.close();

                let mut discarded = 0usize;
                while self.inbound_rx.try_recv().is_ok() {
                    discarded += 1;
                }
                if discarded > 0 {
                    debug!(discarded, "Discarded packets queued behind the failure");
                }
                return TickOutcome::Aborted(dispatched);
            }
            global_metrics().packet_dispatched();
            dispatched += 1;
        }

        TickOutcome::Dispatched(dispatched)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn registry(&self) -> &AddressRegistry {
        self.connection.registry()
    }

    pub fn registry_mut(&mut self) -> &mut AddressRegistry {
        self.connection.registry_mut()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Closes the link; the next tick reports the disconnect.
    pub fn close(&mut self) {
        self.connection.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .field("disconnect_handled", &self.disconnect_handled)
            .field("close_on_framing_error", &self.close_on_framing_error)
            .finish()
    }
}
