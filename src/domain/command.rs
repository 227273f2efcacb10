//! Command entity and its forward-only status state machine.
//!
//! ```text
//! PENDING ──▶ IN_PROGRESS ──┬──▶ SUCCESS
//!                           └──▶ FAILED
//! ```
//!
//! `completed_at` is set exactly when the status becomes terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CommandId, DeviceId};
use crate::error::GatewayError;

/// Kind of work a raybot is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    /// Drive forward.
    MoveForward,
    /// Drive backward.
    MoveBackward,
    /// Navigate to a named location.
    MoveToLocation,
    /// Halt any motion in progress.
    Stop,
}

impl CommandType {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MoveForward => "MOVE_FORWARD",
            Self::MoveBackward => "MOVE_BACKWARD",
            Self::MoveToLocation => "MOVE_TO_LOCATION",
            Self::Stop => "STOP",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MOVE_FORWARD" => Ok(Self::MoveForward),
            "MOVE_BACKWARD" => Ok(Self::MoveBackward),
            "MOVE_TO_LOCATION" => Ok(Self::MoveToLocation),
            "STOP" => Ok(Self::Stop),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown command type: {other}"
            ))),
        }
    }
}

/// Execution status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// Persisted, not yet acknowledged by the device.
    Pending,
    /// The device reported it started executing.
    InProgress,
    /// Terminal: completed successfully.
    Success,
    /// Terminal: the device reported a failure.
    Failed,
}

impl CommandStatus {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Returns `true` for `SUCCESS` and `FAILED`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Returns `true` if the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress) | (Self::InProgress, Self::Success | Self::Failed)
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(GatewayError::InvalidRequest(format!(
                "unknown command status: {other}"
            ))),
        }
    }
}

/// A unit of work addressed to one raybot.
///
/// This is also the snapshot carried by the `command.created` bus event,
/// so unknown fields are ignored on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Command {
    /// Command identifier.
    pub id: CommandId,
    /// Addressed raybot.
    pub device_id: DeviceId,
    /// What the raybot should do.
    #[serde(rename = "type")]
    pub command_type: CommandType,
    /// Current status.
    pub status: CommandStatus,
    /// Opaque command parameters forwarded to the device as `data`.
    #[serde(default = "empty_inputs")]
    #[schema(value_type = Object)]
    pub inputs: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set once the status becomes terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

fn empty_inputs() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Command {
    /// Builds a new `PENDING` command stamped with the current time.
    #[must_use]
    pub fn new(device_id: DeviceId, command_type: CommandType) -> Self {
        Self {
            id: CommandId::new(),
            device_id,
            command_type,
            status: CommandStatus::Pending,
            inputs: empty_inputs(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Attaches command parameters. `null` is normalized to `{}`.
    #[must_use]
    pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
        self.inputs = if inputs.is_null() {
            empty_inputs()
        } else {
            inputs
        };
        self
    }

    /// Returns `true` once the command reached `SUCCESS` or `FAILED`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advances the status, stamping `completed_at` on terminal states.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidTransition`] if the state machine
    /// does not allow the move; the command is left untouched.
    pub fn transition(&mut self, next: CommandStatus) -> Result<(), GatewayError> {
        if !self.status.can_transition_to(next) {
            return Err(GatewayError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
