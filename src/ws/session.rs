//! Per-device session actor.
//!
//! A [`DeviceSession`] owns one raybot connection. It is shared as
//! `Arc<DeviceSession>` between the hub registry and its two pumps:
//!
//! - the write pump drains the bounded outbound queue and pings the
//!   device every `ping_period`;
//! - the read pump enforces the pong deadline and hands each data frame
//!   to [`super::inbound::dispatch`].
//!
//! A session touches device status only once the hub has accepted it
//! ([`DeviceSession::activate`]). Whichever pump stops first cancels the
//! other. The session is then unregistered from the hub, which runs
//! [`DeviceSession::close`]. Close is idempotent and always leaves the
//! device `OFFLINE`: status writes are serialized with it and skipped
//! once it has run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::hub::HubHandle;
use super::inbound;
use super::messages::{OutboundCommand, SendError, truncate_reason};
use crate::config::SessionConfig;
use crate::domain::{Command, CommandId, CommandStatus, Device, DeviceId, DeviceTransition};
use crate::error::GatewayError;
use crate::service::{CommandService, DeviceService};

/// Collaborators every session needs.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Device records and status bookkeeping.
    pub devices: DeviceService,
    /// Command lookups and state changes.
    pub commands: CommandService,
    /// Timing and sizing knobs.
    pub config: SessionConfig,
}

/// Runtime state of one connected raybot.
#[derive(Debug)]
pub struct DeviceSession {
    device: Device,
    session_id: Uuid,
    ctx: SessionContext,
    outbound: mpsc::Sender<String>,
    in_flight: Mutex<HashMap<CommandId, Command>>,
    close_frame: Mutex<Option<(u16, String)>>,
    status_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    stop: CancellationToken,
}

impl DeviceSession {
    /// Loads the device and builds a session together with the receiving
    /// end of its outbound queue. Device status is left untouched until
    /// [`DeviceSession::activate`].
    ///
    /// # Errors
    ///
    /// - [`GatewayError::DeviceNotFound`] if the raybot is not registered.
    /// - Any other store error raised while loading it.
    pub async fn open(
        device_id: DeviceId,
        ctx: SessionContext,
    ) -> Result<(Arc<Self>, mpsc::Receiver<String>), GatewayError> {
        let device = ctx.devices.get(device_id).await?;

        let (outbound, rx) = mpsc::channel(ctx.config.outbound_capacity.max(1));
        let session = Arc::new(Self {
            device,
            session_id: Uuid::new_v4(),
            ctx,
            outbound,
            in_flight: Mutex::new(HashMap::new()),
            close_frame: Mutex::new(None),
            status_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            stop: CancellationToken::new(),
        });

        tracing::info!(
            device_id = %device_id,
            session_id = %session.session_id,
            "raybot session opened"
        );
        Ok((session, rx))
    }

    /// Device id this session serves.
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device.id
    }

    /// Device snapshot taken when the session opened.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Unique id of this session, distinguishing reconnects of one device.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns `true` once [`DeviceSession::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Queues a command for the device without waiting.
    ///
    /// The command is tracked as in flight until the device reports a
    /// terminal status for it.
    ///
    /// # Errors
    ///
    /// - [`SendError::QueueFull`] if the peer is not draining its queue.
    /// - [`SendError::Closed`] if the session is closed.
    /// - [`SendError::Encode`] if the frame cannot be serialized.
    pub fn send(&self, command: &Command) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        let frame = OutboundCommand::from(command)
            .to_json()
            .map_err(|e| SendError::Encode(e.to_string()))?;

        self.track(command);
        let result = self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        });
        if result.is_err() {
            self.forget(command.id);
        } else {
            tracing::debug!(
                device_id = %self.device.id,
                command_id = %command.id,
                command_type = %command.command_type,
                "command queued"
            );
        }
        result
    }

    /// Records the close code and reason the write pump sends when the
    /// session stops. The first recorded reason wins.
    pub fn set_close_frame(&self, code: u16, reason: impl Into<String>) {
        let mut frame = lock(&self.close_frame);
        if frame.is_none() {
            *frame = Some((code, truncate_reason(reason.into())));
        }
    }

    /// Marks the device `IDLE` once the hub has accepted this session.
    /// A no-op after [`DeviceSession::close`].
    ///
    /// # Errors
    ///
    /// Any store error raised while loading or updating the device.
    pub async fn activate(&self) -> Result<(), GatewayError> {
        if let Some(device) = self.transition(DeviceTransition::Connect).await? {
            tracing::debug!(
                device_id = %device.id,
                session_id = %self.session_id,
                status = %device.status,
                "raybot activated"
            );
        }
        Ok(())
    }

    /// Applies a status change on behalf of this session. Returns `None`
    /// without writing once the session is closed.
    pub(crate) async fn transition(
        &self,
        transition: DeviceTransition,
    ) -> Result<Option<Device>, GatewayError> {
        let _guard = self.status_lock.lock().await;
        if self.is_closed() {
            return Ok(None);
        }
        self.ctx
            .devices
            .transition(self.device.id, transition)
            .await
            .map(Some)
    }

    /// Stops both pumps without touching device status.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Tears the session down: marks the device `OFFLINE`, stops both
    /// pumps, and drops every in-flight command. Only the first call has
    /// any effect.
    ///
    /// A failed status update is logged, not returned.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.cancel();
        let dropped = {
            let mut in_flight = lock(&self.in_flight);
            let n = in_flight.len();
            in_flight.clear();
            n
        };

        let _guard = self.status_lock.lock().await;
        if let Err(e) = self
            .ctx
            .devices
            .transition(self.device.id, DeviceTransition::Disconnect)
            .await
        {
            tracing::error!(
                device_id = %self.device.id,
                error = %e,
                "failed to mark raybot offline"
            );
        }

        tracing::info!(
            device_id = %self.device.id,
            session_id = %self.session_id,
            dropped_in_flight = dropped,
            "raybot session closed"
        );
    }

    /// Drives the connection until either pump stops, then unregisters
    /// from the hub. Falls back to closing directly if the hub is gone.
    pub async fn run(
        self: Arc<Self>,
        socket: WebSocket,
        outbound: mpsc::Receiver<String>,
        hub: HubHandle,
    ) {
        let (sink, stream) = socket.split();
        let writer = tokio::spawn(write_pump(Arc::clone(&self), sink, outbound));

        read_pump(&self, stream).await;
        self.stop();

        if hub
            .unregister(self.device.id, self.session_id)
            .await
            .is_err()
        {
            self.close().await;
        }
        if let Err(e) = writer.await {
            tracing::error!(device_id = %self.device.id, error = %e, "write pump panicked");
        }
    }

    pub(crate) fn in_flight(&self, id: CommandId) -> Option<Command> {
        lock(&self.in_flight).get(&id).cloned()
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Stores the latest snapshot, dropping it once terminal.
    pub(crate) fn settle(&self, command: &Command) {
        let mut in_flight = lock(&self.in_flight);
        if command.is_terminal() {
            in_flight.remove(&command.id);
        } else if !self.is_closed() {
            in_flight.insert(command.id, command.clone());
        }
    }

    pub(crate) fn forget(&self, id: CommandId) {
        lock(&self.in_flight).remove(&id);
    }

    pub(crate) fn any_in_progress(&self) -> bool {
        lock(&self.in_flight)
            .values()
            .any(|c| c.status == CommandStatus::InProgress)
    }

    fn track(&self, command: &Command) {
        lock(&self.in_flight).insert(command.id, command.clone());
    }

    fn take_close_frame(&self) -> Option<CloseFrame> {
        lock(&self.close_frame).take().map(|(code, reason)| CloseFrame {
            code,
            reason: Utf8Bytes::from(reason),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn write_pump(
    session: Arc<DeviceSession>,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
) {
    let cfg = session.ctx.config;
    let mut ticker = tokio::time::interval_at(Instant::now() + cfg.ping_period, cfg.ping_period);
    let device_id = session.device.id;

    loop {
        let message = tokio::select! {
            () = session.stop.cancelled() => {
                let frame = session.take_close_frame();
                let _ = tokio::time::timeout(cfg.write_wait, sink.send(Message::Close(frame))).await;
                break;
            }
            frame = outbound.recv() => match frame {
                Some(text) => Message::Text(Utf8Bytes::from(text)),
                None => break,
            },
            _ = ticker.tick() => Message::Ping(axum::body::Bytes::new()),
        };

        match tokio::time::timeout(cfg.write_wait, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(device_id = %device_id, error = %e, "socket write failed");
                break;
            }
            Err(_) => {
                tracing::warn!(device_id = %device_id, "socket write timed out");
                break;
            }
        }
    }

    session.stop();
    tracing::debug!(device_id = %device_id, "write pump stopped");
}

async fn read_pump(session: &DeviceSession, mut stream: SplitStream<WebSocket>) {
    let pong_wait = session.ctx.config.pong_wait;
    let device_id = session.device.id;
    let deadline = tokio::time::sleep(pong_wait);
    tokio::pin!(deadline);

    loop {
        let frame = tokio::select! {
            () = session.stop.cancelled() => break,
            () = &mut deadline => {
                tracing::warn!(device_id = %device_id, "no pong within read deadline");
                break;
            }
            frame = stream.next() => frame,
        };

        let payload = match frame {
            Some(Ok(Message::Pong(_))) => {
                deadline.as_mut().reset(Instant::now() + pong_wait);
                continue;
            }
            Some(Ok(Message::Text(text))) => text.as_str().as_bytes().to_vec(),
            Some(Ok(Message::Binary(bytes))) => bytes.to_vec(),
            Some(Ok(Message::Ping(_))) => continue,
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(device_id = %device_id, ?frame, "raybot closed the connection");
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(device_id = %device_id, error = %e, "socket read failed");
                break;
            }
            None => break,
        };

        tracing::debug!(device_id = %device_id, bytes = payload.len(), "frame received");
        if let Err(violation) = inbound::dispatch(session, &payload).await {
            tracing::warn!(
                device_id = %device_id,
                code = violation.close_code(),
                reason = %violation,
                "protocol violation, closing session"
            );
            session.set_close_frame(violation.close_code(), violation.reason());
            break;
        }
    }
}
