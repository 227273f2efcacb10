//! Connection hub: the single owner of the live-session registry.
//!
//! The registry map lives inside one spawned task. Everything else talks
//! to it through a cloneable [`HubHandle`] that sends [`HubMessage`]s over
//! a bounded mailbox, so registration, lookup and delivery are all
//! serialized by that task. Entries are keyed by device id and tagged
//! with the session id, which lets a late `unregister` from a dead
//! session leave a newer session for the same device in place.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messages::{CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION, SendError};
use super::session::{DeviceSession, SessionContext};
use crate::domain::{Command, DeviceId};
use crate::error::GatewayError;

/// Close code sent to every device when the gateway shuts down.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Requests handled by the hub loop.
#[derive(Debug)]
pub enum HubMessage {
    /// Add a freshly opened session. Replies `false` if the device already
    /// has one.
    Register {
        /// Session to add.
        session: Arc<DeviceSession>,
        /// Accepted / rejected.
        reply: oneshot::Sender<bool>,
    },
    /// Remove and close a session if it is still the registered one.
    Unregister {
        /// Device the session serves.
        device_id: DeviceId,
        /// Session asking to leave.
        session_id: Uuid,
    },
    /// Ask whether a device has a live session.
    IsConnected {
        /// Device to look up.
        device_id: DeviceId,
        /// Lookup result.
        reply: oneshot::Sender<bool>,
    },
    /// List every connected device.
    ConnectedDevices {
        /// Connected device ids, in no particular order.
        reply: oneshot::Sender<Vec<DeviceId>>,
    },
    /// Hand a command to the addressed device's session, if any.
    Deliver {
        /// Command to send.
        command: Command,
    },
    /// Close every session and stop the loop.
    Shutdown {
        /// Signalled once every session is closed.
        done: oneshot::Sender<()>,
    },
}

/// The registry actor. Construct with [`Hub::spawn`].
#[derive(Debug)]
pub struct Hub {
    sessions: HashMap<DeviceId, Arc<DeviceSession>>,
    mailbox: mpsc::Receiver<HubMessage>,
}

impl Hub {
    /// Starts the hub loop and returns its handle.
    #[must_use]
    pub fn spawn(mailbox_capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (tx, mailbox) = mpsc::channel(mailbox_capacity.max(1));
        let hub = Self {
            sessions: HashMap::new(),
            mailbox,
        };
        let task = tokio::spawn(hub.run());
        (HubHandle { tx }, task)
    }

    async fn run(mut self) {
        tracing::info!("hub started");
        let mut done = None;

        while let Some(message) = self.mailbox.recv().await {
            match message {
                HubMessage::Register { session, reply } => self.register(session, reply),
                HubMessage::Unregister {
                    device_id,
                    session_id,
                } => self.unregister(device_id, session_id).await,
                HubMessage::IsConnected { device_id, reply } => {
                    let _ = reply.send(self.sessions.contains_key(&device_id));
                }
                HubMessage::ConnectedDevices { reply } => {
                    let _ = reply.send(self.sessions.keys().copied().collect());
                }
                HubMessage::Deliver { command } => self.deliver(command).await,
                HubMessage::Shutdown { done: signal } => {
                    done = Some(signal);
                    break;
                }
            }
        }

        let live = self.sessions.len();
        for (_, session) in self.sessions.drain() {
            session.set_close_frame(CLOSE_GOING_AWAY, "server shutting down");
            session.close().await;
        }
        tracing::info!(closed_sessions = live, "hub stopped");
        if let Some(signal) = done {
            let _ = signal.send(());
        }
    }

    fn register(&mut self, session: Arc<DeviceSession>, reply: oneshot::Sender<bool>) {
        let device_id = session.device_id();
        let accepted = !self.sessions.contains_key(&device_id);
        if accepted {
            tracing::info!(
                device_id = %device_id,
                session_id = %session.session_id(),
                connected = self.sessions.len() + 1,
                "raybot registered"
            );
            self.sessions.insert(device_id, session);
        } else {
            tracing::warn!(device_id = %device_id, "duplicate registration rejected");
        }
        let _ = reply.send(accepted);
    }

    async fn unregister(&mut self, device_id: DeviceId, session_id: Uuid) {
        let current = self
            .sessions
            .get(&device_id)
            .is_some_and(|s| s.session_id() == session_id);
        if !current {
            tracing::debug!(device_id = %device_id, %session_id, "unregister for stale session ignored");
            return;
        }
        if let Some(session) = self.sessions.remove(&device_id) {
            session.close().await;
            tracing::info!(device_id = %device_id, %session_id, "raybot unregistered");
        }
    }

    async fn deliver(&mut self, command: Command) {
        let device_id = command.device_id;
        let Some(session) = self.sessions.get(&device_id) else {
            tracing::info!(
                device_id = %device_id,
                command_id = %command.id,
                "raybot offline, command not delivered"
            );
            return;
        };

        match session.send(&command) {
            Ok(()) => {}
            Err(SendError::QueueFull) => {
                tracing::warn!(
                    device_id = %device_id,
                    command_id = %command.id,
                    "outbound queue full, dropping session"
                );
                if let Some(session) = self.sessions.remove(&device_id) {
                    session.set_close_frame(CLOSE_POLICY_VIOLATION, "outbound queue full");
                    session.close().await;
                }
            }
            Err(SendError::Closed) => {
                tracing::debug!(
                    device_id = %device_id,
                    command_id = %command.id,
                    "session already closed, removing it"
                );
                if let Some(session) = self.sessions.remove(&device_id) {
                    session.close().await;
                }
            }
            Err(e @ SendError::Encode(_)) => {
                tracing::error!(command_id = %command.id, error = %e, "command not delivered");
            }
        }
    }
}

/// Cloneable client of the hub loop.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubMessage>,
}

impl HubHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubMessage,
    ) -> Result<T, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.post(build(reply)).await?;
        rx.await.map_err(|_| hub_stopped())
    }

    async fn post(&self, message: HubMessage) -> Result<(), GatewayError> {
        self.tx.send(message).await.map_err(|_| hub_stopped())
    }

    /// Adds a session to the registry.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::DeviceAlreadyConnected`] if the device already
    ///   has a live session; the existing one is untouched.
    /// - [`GatewayError::Internal`] if the hub has stopped.
    pub async fn register(&self, session: Arc<DeviceSession>) -> Result<(), GatewayError> {
        let device_id = session.device_id();
        let accepted = self
            .request(|reply| HubMessage::Register { session, reply })
            .await?;
        if accepted {
            Ok(())
        } else {
            Err(GatewayError::DeviceAlreadyConnected(device_id))
        }
    }

    /// Removes and closes a session. A no-op if the session is no longer
    /// the registered one.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Internal`] if the hub has stopped.
    pub async fn unregister(
        &self,
        device_id: DeviceId,
        session_id: Uuid,
    ) -> Result<(), GatewayError> {
        self.post(HubMessage::Unregister {
            device_id,
            session_id,
        })
        .await
    }

    /// Returns `true` if the device has a live session.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Internal`] if the hub has stopped.
    pub async fn is_connected(&self, device_id: DeviceId) -> Result<bool, GatewayError> {
        self.request(|reply| HubMessage::IsConnected { device_id, reply })
            .await
    }

    /// Lists connected devices.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Internal`] if the hub has stopped.
    pub async fn connected_devices(&self) -> Result<Vec<DeviceId>, GatewayError> {
        self.request(|reply| HubMessage::ConnectedDevices { reply })
            .await
    }

    /// Forwards a command to its device's session. Offline devices are
    /// skipped silently.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Internal`] if the hub has stopped.
    pub async fn deliver(&self, command: Command) -> Result<(), GatewayError> {
        self.post(HubMessage::Deliver { command }).await
    }

    /// Closes every live session and stops the loop.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Internal`] if the hub had already stopped.
    pub async fn shutdown(&self) -> Result<(), GatewayError> {
        self.request(|done| HubMessage::Shutdown { done }).await
    }

    /// Turns an upgraded socket into a registered, running session.
    ///
    /// Opens the session, registers it, marks the device `IDLE` and runs
    /// its pumps until the connection ends. A rejected duplicate never
    /// touches device status. Failures are logged and the socket is closed
    /// with an explanatory frame.
    pub async fn handle_connect(
        self,
        mut socket: WebSocket,
        device_id: DeviceId,
        ctx: SessionContext,
    ) {
        let (session, outbound) = match DeviceSession::open(device_id, ctx).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::error!(device_id = %device_id, error = %e, "failed to open raybot session");
                close_socket(&mut socket, CLOSE_INTERNAL_ERROR, "failed to open session").await;
                return;
            }
        };

        match self.register(Arc::clone(&session)).await {
            Ok(()) => {}
            Err(GatewayError::DeviceAlreadyConnected(_)) => {
                tracing::warn!(device_id = %device_id, "raybot is already connected");
                close_socket(&mut socket, CLOSE_POLICY_VIOLATION, "already connected").await;
                return;
            }
            Err(e) => {
                tracing::error!(device_id = %device_id, error = %e, "failed to register raybot session");
                close_socket(&mut socket, CLOSE_INTERNAL_ERROR, "server shutting down").await;
                return;
            }
        }

        if let Err(e) = session.activate().await {
            tracing::error!(device_id = %device_id, error = %e, "failed to activate raybot");
            if self
                .unregister(device_id, session.session_id())
                .await
                .is_err()
            {
                session.close().await;
            }
            close_socket(&mut socket, CLOSE_INTERNAL_ERROR, "failed to open session").await;
            return;
        }

        session.run(socket, outbound, self).await;
    }
}

fn hub_stopped() -> GatewayError {
    GatewayError::Internal("hub stopped".to_string())
}

async fn close_socket(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "failed to send close frame");
    }
}
