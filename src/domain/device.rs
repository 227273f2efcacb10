//! Raybot device record and its coarse activity status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::DeviceId;
use crate::error::GatewayError;

/// Coarse-grained activity signal observed by other systems.
///
/// `OFFLINE → IDLE` on session establishment, `* → OFFLINE` on session
/// teardown, `IDLE ⇄ BUSY` while commands execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    /// No live session.
    Offline,
    /// Connected and not executing a command.
    Idle,
    /// Connected and executing a command.
    Busy,
}

impl DeviceStatus {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Idle => "IDLE",
            Self::Busy => "BUSY",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFFLINE" => Ok(Self::Offline),
            "IDLE" => Ok(Self::Idle),
            "BUSY" => Ok(Self::Busy),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown device status: {other}"
            ))),
        }
    }
}

/// Lifecycle step applied to a [`Device`] by its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTransition {
    /// A session was established. A status left behind by an earlier
    /// session is discarded before [`Device::activate`].
    Connect,
    /// The session ended: [`Device::deactivate`].
    Disconnect,
    /// A command started: [`Device::start_working`].
    StartWorking,
    /// Work finished: [`Device::stop_working`].
    StopWorking,
}

/// A registered raybot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    /// Device identity.
    pub id: DeviceId,
    /// Human-readable name.
    pub name: String,
    /// Bearer token issued at registration.
    pub token: String,
    /// Current activity status.
    pub status: DeviceStatus,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Registers a new offline device with a random bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, GatewayError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "device name cannot be empty".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: DeviceId::new(),
            name,
            token: uuid::Uuid::new_v4().to_string(),
            status: DeviceStatus::Offline,
            created_at: now,
            updated_at: now,
        })
    }

    /// `OFFLINE → IDLE`; no-op otherwise.
    pub fn activate(&mut self) {
        if self.status == DeviceStatus::Offline {
            self.set_status(DeviceStatus::Idle);
        }
    }

    /// `* → OFFLINE`; no-op when already offline.
    pub fn deactivate(&mut self) {
        if self.status != DeviceStatus::Offline {
            self.set_status(DeviceStatus::Offline);
        }
    }

    /// `IDLE → BUSY`; no-op otherwise.
    pub fn start_working(&mut self) {
        if self.status == DeviceStatus::Idle {
            self.set_status(DeviceStatus::Busy);
        }
    }

    /// `BUSY → IDLE`; no-op otherwise.
    pub fn stop_working(&mut self) {
        if self.status == DeviceStatus::Busy {
            self.set_status(DeviceStatus::Idle);
        }
    }

    /// Applies one lifecycle step. Steps whose precondition does not hold
    /// leave the device untouched.
    pub fn apply(&mut self, transition: DeviceTransition) {
        match transition {
            DeviceTransition::Connect => {
                if self.status != DeviceStatus::Offline {
                    self.status = DeviceStatus::Offline;
                }
                self.activate();
            }
            DeviceTransition::Disconnect => self.deactivate(),
            DeviceTransition::StartWorking => self.start_working(),
            DeviceTransition::StopWorking => self.stop_working(),
        }
    }

    fn set_status(&mut self, status: DeviceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
