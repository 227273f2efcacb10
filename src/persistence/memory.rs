//! In-memory stores backed by `tokio::sync::RwLock<HashMap<..>>`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CommandStore, DeviceStore};
use crate::domain::{Command, CommandId, Device, DeviceId, DeviceStatus};
use crate::error::GatewayError;

/// Process-local command store.
#[derive(Debug, Default)]
pub struct MemoryCommandStore {
    commands: RwLock<HashMap<CommandId, Command>>,
}

impl MemoryCommandStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandStore for MemoryCommandStore {
    async fn get(&self, id: CommandId) -> Result<Command, GatewayError> {
        self.commands
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(GatewayError::CommandNotFound(id))
    }

    async fn list_by_device(&self, device_id: DeviceId) -> Result<Vec<Command>, GatewayError> {
        let map = self.commands.read().await;
        let mut commands: Vec<Command> = map
            .values()
            .filter(|c| c.device_id == device_id)
            .cloned()
            .collect();
        commands.sort_by_key(|c| c.created_at);
        Ok(commands)
    }

    async fn create(&self, command: &Command) -> Result<(), GatewayError> {
        let mut map = self.commands.write().await;
        if map.contains_key(&command.id) {
            return Err(GatewayError::PersistenceError(format!(
                "command {} already exists",
                command.id
            )));
        }
        map.insert(command.id, command.clone());
        Ok(())
    }

    async fn update(&self, command: &Command) -> Result<(), GatewayError> {
        let mut map = self.commands.write().await;
        let stored = map
            .get_mut(&command.id)
            .ok_or(GatewayError::CommandNotFound(command.id))?;
        stored.status = command.status;
        stored.completed_at = command.completed_at;
        Ok(())
    }

    async fn delete(&self, id: CommandId) -> Result<(), GatewayError> {
        self.commands
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(GatewayError::CommandNotFound(id))
    }
}

/// Process-local device store.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<DeviceId, Device>>,
}

impl MemoryDeviceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn get(&self, id: DeviceId) -> Result<Device, GatewayError> {
        self.devices
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(GatewayError::DeviceNotFound(id))
    }

    async fn list(&self) -> Result<Vec<Device>, GatewayError> {
        let mut devices: Vec<Device> = self.devices.read().await.values().cloned().collect();
        devices.sort_by_key(|d| d.created_at);
        Ok(devices)
    }

    async fn create(&self, device: &Device) -> Result<(), GatewayError> {
        let mut map = self.devices.write().await;
        if map.contains_key(&device.id) {
            return Err(GatewayError::DeviceAlreadyExists(device.id));
        }
        map.insert(device.id, device.clone());
        Ok(())
    }

    async fn delete(&self, id: DeviceId) -> Result<(), GatewayError> {
        self.devices
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(GatewayError::DeviceNotFound(id))
    }

    async fn update_status(
        &self,
        id: DeviceId,
        status: DeviceStatus,
    ) -> Result<Device, GatewayError> {
        let mut map = self.devices.write().await;
        let device = map.get_mut(&id).ok_or(GatewayError::DeviceNotFound(id))?;
        device.status = status;
        device.updated_at = Utc::now();
        Ok(device.clone())
    }
}
