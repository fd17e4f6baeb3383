//! Session actor: one task owning the command channel and all input state
//!
//! Every raw event (pointer sample, key edge, speed submission, timer
//! expiry, connect/disconnect request) is processed as a sequential message
//! on this task, so token de-duplication and the disconnect safety stop are
//! strictly ordered and no two watchdog callbacks can ever be pending at
//! once.
//!
//! # Engine lifecycle
//!
//! ```text
//! Initializing ──► Active ──► Deactivating ──► Deactivated
//!                    │             ▲
//!                    └─────────────┘
//!                      (shutdown)
//! ```
//!
//! # Link state (inside Active)
//!
//! ```text
//! Disconnected ──connect ok──► Connected
//! Connected ──disconnect──► Disconnected   (safety stop first)
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use statum::{machine, state};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::RigSettings;
use crate::link::{ChannelError, CommandChannel, MotionToken, TransportFactory};
use crate::mapping::{
    KeyDirection, KeyInputController, MotionMapper, PointerSample, SpeedCommand, SpeedError,
};
use crate::session::watchdog::IdleWatchdog;

/// Bound on the retained error log in [`SessionStatus`]
const ERROR_LOG_LIMIT: usize = 32;

/// Connection state of the session's link
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
}

/// Snapshot of the session broadcast to observers on every change
#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connection_state: SessionState,
    pub port: Option<String>,
    /// Last token that actually went out on the wire
    pub last_token: Option<MotionToken>,
    pub commands_sent: usize,
    pub error_messages: Vec<String>,
    pub last_activity: Option<DateTime<Local>>,
}

/// Raw events forwarded by the presentation layer
#[derive(Clone, Debug)]
pub enum InputEvent {
    /// Pointer sample relative to its surface center
    PointerMoved(PointerSample),
    /// Pointer left the input surface: stop immediately, without waiting
    /// for the idle timeout
    PointerLeft,
    KeyPressed(KeyDirection),
    KeyReleased(KeyDirection),
    /// Explicit stop request ("release all")
    StopRequested,
}

/// Errors surfaced on the handle's request/reply operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("invalid speed: {0}")]
    Speed(#[from] SpeedError),

    #[error("session already connected to {0}")]
    AlreadyConnected(String),

    #[error("session is not connected")]
    NotConnected,

    #[error("session task unavailable: {0}")]
    TaskUnavailable(String),
}

/// Messages delivered to the session task
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Connect {
        port: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    SetSpeed {
        raw: String,
        reply: oneshot::Sender<Result<i64, SessionError>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Input(InputEvent),
    Shutdown,
}

/// Lifecycle states of the session engine
#[state]
#[derive(Debug, Clone)]
pub enum SessionEngineState {
    Initializing,
    Active,
    Deactivating,
    Deactivated,
}

/// The session actor with compile-time lifecycle safety via statum
#[machine]
pub struct SessionEngine<S: SessionEngineState> {
    settings: RigSettings,
    factory: Box<dyn TransportFactory>,
    channel: CommandChannel,
    mapper: MotionMapper,
    keys: KeyInputController,
    watchdog: IdleWatchdog,
    status: SessionStatus,
    status_tx: watch::Sender<SessionStatus>,
}

impl<S: SessionEngineState> SessionEngine<S> {
    pub fn settings(&self) -> &RigSettings {
        &self.settings
    }

    /// Records a successful transmission in the status snapshot
    fn note_transmission(&mut self, token: MotionToken) {
        self.status.last_token = Some(token);
        self.status.commands_sent += 1;
        self.status.last_activity = Some(Local::now());
    }

    fn push_error(&mut self, error: &dyn fmt::Display) {
        self.status.error_messages.push(error.to_string());
        // Bounded log: keep only the most recent entries.
        if self.status.error_messages.len() > ERROR_LOG_LIMIT {
            let overflow = self.status.error_messages.len() - ERROR_LOG_LIMIT;
            self.status.error_messages.drain(..overflow);
        }
    }

    fn broadcast(&mut self) {
        self.status_tx.send_replace(self.status.clone());
    }

    /// Sends through the de-duplication gate, updating status on success
    fn transmit(&mut self, token: MotionToken) {
        match self.channel.send(token) {
            Ok(true) => {
                self.note_transmission(token);
                self.broadcast();
            }
            Ok(false) => {}
            Err(e) => {
                // Surfaced, never retried: the next differing token or an
                // explicit user action is the only recovery path.
                warn!("Transmission of {} failed: {}", token, e);
                self.push_error(&e);
                self.broadcast();
            }
        }
    }

    /// Safety-stop-then-close sequence shared by disconnect and shutdown
    fn teardown_link(&mut self) {
        self.watchdog.cancel();
        if self.channel.close() {
            self.note_transmission(MotionToken::Stop);
        }
        self.keys.reset();
        self.status.connection_state = SessionState::Disconnected;
        self.status.port = None;
        self.broadcast();
    }
}

impl SessionEngine<Initializing> {
    pub fn create(
        settings: RigSettings,
        factory: Box<dyn TransportFactory>,
        status_tx: watch::Sender<SessionStatus>,
    ) -> Self {
        info!("Initializing session engine with settings: {:?}", settings);

        let mapper = MotionMapper::new(settings.dead_zone);
        let watchdog = IdleWatchdog::new(Duration::from_millis(settings.idle_timeout_ms));

        Self::new(
            settings,
            factory,
            CommandChannel::new(),
            mapper,
            KeyInputController::new(),
            watchdog,
            SessionStatus::default(),
            status_tx,
        )
    }

    pub fn activate(self) -> SessionEngine<Active> {
        info!("Activating session engine");
        self.transition()
    }
}

impl SessionEngine<Active> {
    /// Main loop: processes commands FIFO and turns watchdog expiry into
    /// exactly one stop. Runs until a shutdown message arrives or every
    /// handle is dropped.
    pub(crate) async fn run_until_shutdown(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> SessionEngine<Deactivating> {
        info!("Session engine running");

        loop {
            let deadline = self.watchdog.deadline();

            tokio::select! {
                maybe_cmd = commands.recv() => {
                    match maybe_cmd {
                        None => {
                            info!("All session handles dropped, stopping");
                            break;
                        }
                        Some(SessionCommand::Shutdown) => {
                            info!("Session shutdown requested");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                    }
                }

                _ = IdleWatchdog::expires(deadline), if deadline.is_some() => {
                    self.handle_idle_timeout();
                }
            }
        }

        self.transition()
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect { port, reply } => {
                let result = self.handle_connect(port);
                let _ = reply.send(result);
            }
            SessionCommand::Disconnect { reply } => {
                let result = self.handle_disconnect();
                let _ = reply.send(result);
            }
            SessionCommand::SetSpeed { raw, reply } => {
                let result = self.handle_set_speed(&raw);
                let _ = reply.send(result);
            }
            SessionCommand::Status { reply } => {
                let _ = reply.send(self.status.clone());
            }
            SessionCommand::Input(event) => self.handle_input(event),
            // Handled by the run loop before dispatch.
            SessionCommand::Shutdown => {}
        }
    }

    fn handle_connect(&mut self, port: String) -> Result<(), SessionError> {
        if self.channel.is_connected() {
            let current = self.channel.port_name().unwrap_or_default().to_string();
            warn!(
                "Connect to {} requested while already connected to {}",
                port, current
            );
            return Err(SessionError::AlreadyConnected(current));
        }

        let transport = self.factory.open(&port).map_err(|e| {
            error!("Failed to connect: {}", e);
            self.push_error(&e);
            self.broadcast();
            e
        })?;

        self.channel.open(transport, port.clone());
        self.keys.reset();
        self.watchdog.cancel();
        self.status.connection_state = SessionState::Connected;
        self.status.port = Some(port.clone());
        self.broadcast();
        info!("Connected to {}", port);
        Ok(())
    }

    /// Idempotent: disconnecting an already-disconnected session is a no-op
    fn handle_disconnect(&mut self) -> Result<(), SessionError> {
        if !self.channel.is_connected() {
            debug!("Disconnect requested while already disconnected");
            return Ok(());
        }

        self.teardown_link();
        info!("Disconnected serial port");
        Ok(())
    }

    fn handle_set_speed(&mut self, raw: &str) -> Result<i64, SessionError> {
        if !self.channel.is_connected() {
            debug!("Speed submission while disconnected: {:?}", raw);
            return Err(SessionError::NotConnected);
        }

        let cmd = SpeedCommand::parse(raw).map_err(|e| {
            warn!("Rejected speed input {:?}: {}", raw, e);
            e
        })?;

        self.channel.send_speed(&cmd).map_err(|e| {
            warn!("Speed transmission failed: {}", e);
            self.push_error(&e);
            self.broadcast();
            e
        })?;

        self.status.commands_sent += 1;
        self.status.last_activity = Some(Local::now());
        self.broadcast();
        Ok(cmd.value())
    }

    fn handle_input(&mut self, event: InputEvent) {
        if !self.channel.is_connected() {
            debug!("Ignoring input while disconnected: {:?}", event);
            return;
        }

        match event {
            InputEvent::PointerMoved(sample) => {
                let token = self.mapper.classify(&sample);
                if token.is_motion() {
                    self.transmit(token);
                    self.watchdog.arm();
                } else {
                    // Dead zone: the stop itself is what the watchdog
                    // would have done, so the pending deadline goes too.
                    self.transmit(MotionToken::Stop);
                    self.watchdog.cancel();
                }
            }
            InputEvent::PointerLeft => {
                debug!("Pointer left the input surface");
                self.stop_now();
            }
            InputEvent::StopRequested => self.stop_now(),
            InputEvent::KeyPressed(key) => {
                if let Some(token) = self.keys.press(key) {
                    self.transmit(token);
                }
            }
            InputEvent::KeyReleased(key) => {
                // Any tracked key's release stops all motion, even while
                // another key is held; see DESIGN.md.
                if self.keys.release(key) {
                    self.transmit(MotionToken::Stop);
                }
            }
        }
    }

    fn stop_now(&mut self) {
        self.transmit(MotionToken::Stop);
        self.watchdog.cancel();
    }

    fn handle_idle_timeout(&mut self) {
        debug!("Idle timeout reached without qualifying input, forcing stop");
        self.watchdog.cancel();
        self.transmit(MotionToken::Stop);
    }
}

impl SessionEngine<Deactivating> {
    /// Releases the link (safety stop included) and finishes the lifecycle
    pub fn shutdown(mut self) -> SessionEngine<Deactivated> {
        info!("Shutting down session engine");
        if self.channel.is_connected() {
            self.teardown_link();
        }
        self.transition()
    }
}
