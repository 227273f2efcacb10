//! Persistence layer: command and device stores.
//!
//! The core only talks to the [`CommandStore`] and [`DeviceStore`]
//! traits. Two backends are provided: in-memory maps (the default) and
//! PostgreSQL through `sqlx::PgPool`. Both are shared as `Arc<dyn ...>`
//! and must be safe under concurrent calls from sessions and handlers.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

use crate::domain::{Command, CommandId, Device, DeviceId, DeviceStatus};
use crate::error::GatewayError;

pub use memory::{MemoryCommandStore, MemoryDeviceStore};
pub use postgres::{PostgresCommandStore, PostgresDeviceStore};

/// Durable storage for commands.
#[async_trait]
pub trait CommandStore: Send + Sync + fmt::Debug {
    /// Loads a command by id.
    ///
    /// # Errors
    ///
    /// [`GatewayError::CommandNotFound`] if absent.
    async fn get(&self, id: CommandId) -> Result<Command, GatewayError>;

    /// Lists every command addressed to `device_id`, oldest first.
    ///
    /// # Errors
    ///
    /// [`GatewayError::PersistenceError`] on backend failure.
    async fn list_by_device(&self, device_id: DeviceId) -> Result<Vec<Command>, GatewayError>;

    /// Inserts a new command.
    ///
    /// # Errors
    ///
    /// [`GatewayError::PersistenceError`] on backend failure.
    async fn create(&self, command: &Command) -> Result<(), GatewayError>;

    /// Overwrites the status fields of an existing command.
    ///
    /// # Errors
    ///
    /// [`GatewayError::CommandNotFound`] if absent.
    async fn update(&self, command: &Command) -> Result<(), GatewayError>;

    /// Deletes a command regardless of its status.
    ///
    /// # Errors
    ///
    /// [`GatewayError::CommandNotFound`] if absent.
    async fn delete(&self, id: CommandId) -> Result<(), GatewayError>;
}

/// Durable storage for raybot records.
#[async_trait]
pub trait DeviceStore: Send + Sync + fmt::Debug {
    /// Loads a device by id.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DeviceNotFound`] if absent.
    async fn get(&self, id: DeviceId) -> Result<Device, GatewayError>;

    /// Lists every registered device, oldest first.
    ///
    /// # Errors
    ///
    /// [`GatewayError::PersistenceError`] on backend failure.
    async fn list(&self) -> Result<Vec<Device>, GatewayError>;

    /// Registers a new device.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DeviceAlreadyExists`] if the id is taken.
    async fn create(&self, device: &Device) -> Result<(), GatewayError>;

    /// Deletes a device.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DeviceNotFound`] if absent.
    async fn delete(&self, id: DeviceId) -> Result<(), GatewayError>;

    /// Sets the device status and returns the updated record.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DeviceNotFound`] if absent.
    async fn update_status(&self, id: DeviceId, status: DeviceStatus)
    -> Result<Device, GatewayError>;
}
