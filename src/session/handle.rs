//! Handle for the session task
//!
//! Spawns the engine into a tokio background task and exposes the
//! operations the presentation layer calls: request/reply for
//! connect/disconnect/speed/status, fire-and-forget for raw input events,
//! and a watch subscription for status changes.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RigSettings;
use crate::link::{SerialTransportFactory, TransportFactory};
use crate::session::engine::{
    InputEvent, SessionCommand, SessionEngine, SessionError, SessionStatus,
};

/// Capacity of the command queue feeding the session task
const COMMAND_QUEUE_CAPACITY: usize = 100;

/// Owning handle for one rig session
///
/// Each handle owns one independent session; driving several rigs means
/// spawning several handles. Dropping the handle (or calling
/// [`SessionHandle::shutdown`]) ends the task after a best-effort
/// disconnect.
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    status_rx: watch::Receiver<SessionStatus>,
    task_handle: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Spawns a session speaking to real serial ports
    pub fn spawn(settings: RigSettings) -> Self {
        let factory = SerialTransportFactory::new(settings.baud_rate);
        Self::spawn_with_factory(settings, Box::new(factory))
    }

    /// Spawns a session with a caller-provided transport factory
    ///
    /// Tests use this to drive the full session against a scripted fake.
    pub fn spawn_with_factory(settings: RigSettings, factory: Box<dyn TransportFactory>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let engine = SessionEngine::create(settings, factory, status_tx).activate();
        let task_handle = tokio::spawn(async move {
            let engine = engine.run_until_shutdown(command_rx).await;
            engine.shutdown();
        });

        info!("Session task spawned");
        Self {
            command_tx,
            status_rx,
            task_handle: Some(task_handle),
        }
    }

    /// Opens the named endpoint and enables motion/speed inputs
    pub async fn connect(&self, port: &str) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.request(SessionCommand::Connect {
            port: port.to_string(),
            reply,
        })
        .await?;
        response
            .await
            .map_err(|e| SessionError::TaskUnavailable(e.to_string()))?
    }

    /// Safety-stops if needed, closes the link and disables inputs
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.request(SessionCommand::Disconnect { reply }).await?;
        response
            .await
            .map_err(|e| SessionError::TaskUnavailable(e.to_string()))?
    }

    /// Validates and transmits a speed submission, returning the value sent
    pub async fn set_speed(&self, raw: &str) -> Result<i64, SessionError> {
        let (reply, response) = oneshot::channel();
        self.request(SessionCommand::SetSpeed {
            raw: raw.to_string(),
            reply,
        })
        .await?;
        response
            .await
            .map_err(|e| SessionError::TaskUnavailable(e.to_string()))?
    }

    /// Forwards one raw input event to the session
    pub async fn input(&self, event: InputEvent) -> Result<(), SessionError> {
        self.request(SessionCommand::Input(event)).await
    }

    /// Current status, observed after every previously queued command
    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (reply, response) = oneshot::channel();
        self.request(SessionCommand::Status { reply }).await?;
        response
            .await
            .map_err(|e| SessionError::TaskUnavailable(e.to_string()))
    }

    /// Watch receiver broadcasting every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        debug!("New subscriber to session status");
        self.status_rx.clone()
    }

    /// Gracefully stops the session task
    pub async fn shutdown(&mut self) {
        debug!("Sending shutdown signal to session task");
        if self.command_tx.send(SessionCommand::Shutdown).await.is_err() {
            warn!("Session task already terminated");
        }
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!("Session task panicked: {}", e);
            }
        }
    }

    async fn request(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|e| SessionError::TaskUnavailable(e.to_string()))
    }
}
