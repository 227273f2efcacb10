//! Command DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Command, CommandId, CommandStatus, CommandType, DeviceId};

/// Request body for `POST /api/v1/commands`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateCommandRequest {
    /// Addressed raybot.
    pub raybot_id: DeviceId,
    /// What the raybot should do.
    #[serde(rename = "type")]
    pub command_type: CommandType,
    /// Command parameters forwarded to the raybot. Defaults to `{}`.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub inputs: serde_json::Value,
}

/// Public view of a command.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommandDto {
    /// Command identifier.
    pub id: CommandId,
    /// Addressed raybot.
    pub raybot_id: DeviceId,
    /// Command type.
    #[serde(rename = "type")]
    pub command_type: CommandType,
    /// Current status.
    pub status: CommandStatus,
    /// Command parameters.
    #[schema(value_type = Object)]
    pub inputs: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set once the command reached `SUCCESS` or `FAILED`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Command> for CommandDto {
    fn from(command: Command) -> Self {
        Self {
            id: command.id,
            raybot_id: command.device_id,
            command_type: command.command_type,
            status: command.status,
            inputs: command.inputs,
            created_at: command.created_at,
            completed_at: command.completed_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn create_request_defaults_inputs() {
        let id = DeviceId::new();
        let body = format!(r#"{{"raybot_id":"{id}","type":"MOVE_TO_LOCATION"}}"#);
        let Ok(req) = serde_json::from_str::<CreateCommandRequest>(&body) else {
            panic!("valid request rejected");
        };
        assert_eq!(req.raybot_id, id);
        assert_eq!(req.command_type, CommandType::MoveToLocation);
        assert!(req.inputs.is_null());
    }

    #[test]
    fn create_request_rejects_unknown_type() {
        let body = format!(r#"{{"raybot_id":"{}","type":"FLY"}}"#, DeviceId::new());
        assert!(serde_json::from_str::<CreateCommandRequest>(&body).is_err());
    }

    #[test]
    fn dto_renames_device_to_raybot() {
        let cmd = Command::new(DeviceId::new(), CommandType::Stop);
        let Ok(value) = serde_json::to_value(CommandDto::from(cmd.clone())) else {
            panic!("serialize failed");
        };
        assert_eq!(value["raybot_id"], cmd.device_id.to_string());
        assert_eq!(value["type"], "STOP");
        assert_eq!(value["status"], "PENDING");
        assert!(value["completed_at"].is_null());
    }
}
