//! Command service: persists commands and announces their creation.

use std::sync::Arc;

use crate::domain::{
    COMMAND_CREATED_TOPIC, Command, CommandCreated, CommandId, CommandStatus, CommandType,
    DeviceId, EventPublisher,
};
use crate::error::GatewayError;
use crate::persistence::{CommandStore, DeviceStore};

/// Orchestration layer for every command mutation.
///
/// Stateless coordinator over a [`CommandStore`] for command state, a
/// [`DeviceStore`] to validate the addressed raybot, and an
/// [`EventPublisher`] for `command.created`. Publication always happens
/// after a successful write, never before.
#[derive(Debug, Clone)]
pub struct CommandService {
    commands: Arc<dyn CommandStore>,
    devices: Arc<dyn DeviceStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl CommandService {
    /// Creates a new `CommandService`.
    #[must_use]
    pub fn new(
        commands: Arc<dyn CommandStore>,
        devices: Arc<dyn DeviceStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            commands,
            devices,
            publisher,
        }
    }

    /// Creates a `PENDING` command for `device_id` and publishes
    /// [`COMMAND_CREATED_TOPIC`].
    ///
    /// If publication fails the command stays persisted and the error is
    /// returned to the caller.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::DeviceNotFound`] if the raybot is not registered.
    /// - [`GatewayError::PersistenceError`] if the write fails; nothing is
    ///   published in that case.
    /// - [`GatewayError::PublishFailed`] if the bus refuses the event.
    pub async fn create(
        &self,
        device_id: DeviceId,
        command_type: CommandType,
        inputs: serde_json::Value,
    ) -> Result<Command, GatewayError> {
        self.devices.get(device_id).await?;

        let command = Command::new(device_id, command_type).with_inputs(inputs);
        self.commands.create(&command).await?;

        let payload = CommandCreated(command.clone())
            .encode()
            .map_err(|e| GatewayError::Internal(format!("encode command.created: {e}")))?;

        if let Err(e) = self.publisher.publish(COMMAND_CREATED_TOPIC, payload).await {
            tracing::error!(
                command_id = %command.id,
                device_id = %device_id,
                error = %e,
                "command persisted but not published"
            );
            return Err(e);
        }

        tracing::info!(
            command_id = %command.id,
            device_id = %device_id,
            command_type = %command_type,
            "command created"
        );
        Ok(command)
    }

    /// Loads a command by id.
    ///
    /// # Errors
    ///
    /// [`GatewayError::CommandNotFound`] if absent.
    pub async fn get(&self, id: CommandId) -> Result<Command, GatewayError> {
        self.commands.get(id).await
    }

    /// Lists every command for a raybot, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list_by_device(&self, device_id: DeviceId) -> Result<Vec<Command>, GatewayError> {
        self.commands.list_by_device(device_id).await
    }

    /// Writes the status fields of `command` back to the store.
    ///
    /// # Errors
    ///
    /// [`GatewayError::CommandNotFound`] if absent.
    pub async fn update(&self, command: &Command) -> Result<(), GatewayError> {
        self.commands.update(command).await
    }

    /// Deletes a command regardless of its status.
    ///
    /// # Errors
    ///
    /// [`GatewayError::CommandNotFound`] if absent.
    pub async fn delete(&self, id: CommandId) -> Result<(), GatewayError> {
        self.commands.delete(id).await?;
        tracing::info!(command_id = %id, "command deleted");
        Ok(())
    }

    /// Moves a stored command to `next` and persists it.
    ///
    /// Asking for the status the command already has is a no-op that
    /// returns the stored command unchanged.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::CommandNotFound`] if absent.
    /// - [`GatewayError::InvalidTransition`] if the state machine forbids
    ///   the move; nothing is written.
    pub async fn advance(
        &self,
        id: CommandId,
        next: CommandStatus,
    ) -> Result<Command, GatewayError> {
        let mut command = self.commands.get(id).await?;
        if command.status == next {
            return Ok(command);
        }
        let from = command.status;
        command.transition(next)?;
        self.commands.update(&command).await?;
        tracing::info!(command_id = %id, %from, to = %next, "command status advanced");
        Ok(command)
    }
}
