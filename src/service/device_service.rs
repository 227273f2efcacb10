//! Device service: registration and status bookkeeping.

use std::sync::Arc;

use crate::domain::{Device, DeviceId, DeviceTransition};
use crate::error::GatewayError;
use crate::persistence::DeviceStore;

/// Thin orchestration layer over a [`DeviceStore`].
#[derive(Debug, Clone)]
pub struct DeviceService {
    devices: Arc<dyn DeviceStore>,
}

impl DeviceService {
    /// Creates a new `DeviceService`.
    #[must_use]
    pub fn new(devices: Arc<dyn DeviceStore>) -> Self {
        Self { devices }
    }

    /// Loads a device by id.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DeviceNotFound`] if absent.
    pub async fn get(&self, id: DeviceId) -> Result<Device, GatewayError> {
        self.devices.get(id).await
    }

    /// Lists every registered device.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list(&self) -> Result<Vec<Device>, GatewayError> {
        self.devices.list().await
    }

    /// Registers a new offline device.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidRequest`] for a blank name, or store failures.
    pub async fn register(&self, name: &str) -> Result<Device, GatewayError> {
        let device = Device::new(name)?;
        self.devices.create(&device).await?;
        tracing::info!(device_id = %device.id, name, "raybot registered");
        Ok(device)
    }

    /// Deletes a device.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DeviceNotFound`] if absent.
    pub async fn delete(&self, id: DeviceId) -> Result<(), GatewayError> {
        self.devices.delete(id).await?;
        tracing::info!(device_id = %id, "raybot deleted");
        Ok(())
    }

    /// Loads the device, applies a lifecycle step and persists the new
    /// status. A step whose precondition does not hold writes nothing.
    ///
    /// # Errors
    ///
    /// [`GatewayError::DeviceNotFound`] if absent, or store failures.
    pub async fn transition(
        &self,
        id: DeviceId,
        transition: DeviceTransition,
    ) -> Result<Device, GatewayError> {
        let mut device = self.devices.get(id).await?;
        let before = device.status;
        device.apply(transition);
        if device.status == before {
            tracing::debug!(device_id = %id, ?transition, status = %before, "raybot status unchanged");
            return Ok(device);
        }

        let device = self.devices.update_status(id, device.status).await?;
        tracing::debug!(device_id = %id, from = %before, to = %device.status, "raybot status updated");
        Ok(device)
    }
}
