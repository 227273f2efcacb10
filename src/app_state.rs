//! Shared application state injected into all Axum handlers.

use crate::config::SessionConfig;
use crate::domain::EventBus;
use crate::service::{CommandService, DeviceService};
use crate::ws::{HubHandle, SessionContext};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Command creation, lookup and state changes.
    pub command_service: CommandService,
    /// Raybot registration and status.
    pub device_service: DeviceService,
    /// Client of the connection hub.
    pub hub: HubHandle,
    /// In-process event bus.
    pub event_bus: EventBus,
    /// Tunables handed to every new device session.
    pub session_config: SessionConfig,
}

impl AppState {
    /// Collaborators for a new device session.
    #[must_use]
    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            devices: self.device_service.clone(),
            commands: self.command_service.clone(),
            config: self.session_config,
        }
    }
}
