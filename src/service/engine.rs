//! The background tick thread.
//!
//! An [`Engine`] owns a [`Session`] and drives it at a fixed rate on its own
//! thread. The host talks to it only through two queues: control messages
//! in, notifications out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{DiscoveryConfig, EngineConfig};
use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::KeyExchangeAuthenticator;
use crate::service::{Connection, Session};
use crate::transport::tcp::TcpTransport;
use crate::utils::metrics::global_metrics;
use crate::utils::time::TickTimer;

/// Reply to [`InputMessage::Ping`].
pub const PONG: &str = "PONG!";

/// Control messages from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMessage {
    /// Leave the loop after the current tick.
    Exit,
    /// Answered with [`OutputMessage::Print`] carrying [`PONG`].
    Ping,
}

/// Notifications to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMessage {
    Print(String),
    /// The loop has exited.
    ExitConfirm,
}

/// State moved onto the tick thread and handed back when it exits.
struct Worker {
    session: Session,
    host: String,
    port: u16,
    engine: EngineConfig,
    input: mpsc::UnboundedReceiver<InputMessage>,
    output: mpsc::UnboundedSender<OutputMessage>,
}

impl Worker {
    fn run(mut self) -> Self {
        info!(host = %self.host, port = self.port, "Engine started");

        if let Err(e) = self.session.connect(&self.host, self.port) {
            warn!(error = %e, "Could not connect to load balancer");
        }

        let mut timer = TickTimer::new(self.engine.tick_interval, self.engine.sleep_margin);
        while self.handle_messages() {
            self.session.tick();

            let busy = timer.wait();
            if busy > timer.interval() {
                debug!(busy_ms = busy.as_millis(), "Tick overran its interval");
            }
        }

        self.session.close();
        global_metrics().log_metrics();
        info!("Engine stopped");

        let _ = self.output.send(OutputMessage::ExitConfirm);
        self
    }

    /// Returns `false` once `Exit` has been received.
    fn handle_messages(&mut self) -> bool {
        while let Ok(message) = self.input.try_recv() {
            match message {
                InputMessage::Exit => return false,
                InputMessage::Ping => {
                    let _ = self.output.send(OutputMessage::Print(PONG.to_string()));
                }
            }
        }
        true
    }
}

/// Runs a discovery session on a dedicated thread.
pub struct Engine {
    running: Arc<AtomicBool>,
    worker: Option<Worker>,
    handle: Option<JoinHandle<Worker>>,
    input: mpsc::UnboundedSender<InputMessage>,
    output: mpsc::UnboundedReceiver<OutputMessage>,
}

impl Engine {
    /// Builds an engine that talks TCP to the configured load balancer.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        config.validate_strict()?;

        let transport = TcpTransport::new(config.transport.clone());
        let connection = Connection::new(
            Box::new(transport),
            Box::new(KeyExchangeAuthenticator::new()),
            config.client.credentials(),
        );
        let session = Session::new(connection)?
            .close_on_framing_error(config.transport.close_on_framing_error);

        Ok(Self::with_session(
            session,
            &config.client.host,
            config.client.port,
            config.engine,
        ))
    }

    /// Builds an engine around an existing session.
    pub fn with_session(session: Session, host: &str, port: u16, engine: EngineConfig) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        Self {
            running: Arc::new(AtomicBool::new(false)),
            worker: Some(Worker {
                session,
                host: host.to_string(),
                port,
                engine,
                input: input_rx,
                output: output_tx,
            }),
            handle: None,
            input: input_tx,
            output: output_rx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawns the tick thread. Does nothing if it is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.reclaim();

        let Some(worker) = self.worker.take() else {
            return Err(ProtocolError::Custom("engine worker is unavailable".into()));
        };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name("discovery-engine".into())
            .spawn(move || {
                let worker = worker.run();
                running.store(false, Ordering::Release);
                worker
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                error!(error = %e, "Failed to spawn engine thread");
                Err(e.into())
            }
        }
    }

    /// Asks the tick thread to exit. Does nothing if it is not running.
    pub fn stop(&self) {
        if self.is_running() {
            self.pass_message(InputMessage::Exit);
        }
    }

    pub fn pass_message(&self, message: InputMessage) {
        if self.input.send(message).is_err() {
            debug!("Engine input queue is closed");
        }
    }

    pub fn try_get_message(&mut self) -> Option<OutputMessage> {
        self.output.try_recv().ok()
    }

    /// Waits for the tick thread to finish, so the engine can be started
    /// again. Blocks indefinitely unless [`Engine::stop`] was called.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(worker) => self.worker = Some(worker),
                Err(_) => error!("Engine thread panicked"),
            }
        }
    }

    /// Picks up the worker of a thread that already exited on its own.
    fn reclaim(&mut self) {
        if self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
