//! Database row models for the `raybots` and `commands` tables.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Command, CommandId, Device, DeviceId};
use crate::error::GatewayError;

/// A row of the `raybots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    /// Device id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Bearer token.
    pub token: String,
    /// Status string (`OFFLINE`, `IDLE`, `BUSY`).
    pub status: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for Device {
    type Error = GatewayError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: DeviceId::from_uuid(row.id),
            name: row.name,
            token: row.token,
            status: row.status.parse().map_err(corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row of the `commands` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommandRow {
    /// Command id.
    pub id: Uuid,
    /// Addressed raybot.
    pub raybot_id: Uuid,
    /// Command type string.
    pub command_type: String,
    /// Status string.
    pub status: String,
    /// JSONB command parameters.
    pub inputs: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommandRow> for Command {
    type Error = GatewayError;

    fn try_from(row: CommandRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CommandId::from_uuid(row.id),
            device_id: DeviceId::from_uuid(row.raybot_id),
            command_type: row.command_type.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            inputs: row.inputs,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

fn corrupt(err: GatewayError) -> GatewayError {
    GatewayError::PersistenceError(format!("corrupt row: {err}"))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{CommandStatus, CommandType, DeviceStatus};

    #[test]
    fn command_row_converts() {
        let row = CommandRow {
            id: Uuid::new_v4(),
            raybot_id: Uuid::new_v4(),
            command_type: "MOVE_BACKWARD".to_string(),
            status: "IN_PROGRESS".to_string(),
            inputs: serde_json::json!({}),
            created_at: Utc::now(),
            completed_at: None,
        };
        let Ok(cmd) = Command::try_from(row) else {
            panic!("conversion failed");
        };
        assert_eq!(cmd.command_type, CommandType::MoveBackward);
        assert_eq!(cmd.status, CommandStatus::InProgress);
    }

    #[test]
    fn unknown_status_is_a_persistence_error() {
        let now = Utc::now();
        let row = DeviceRow {
            id: Uuid::new_v4(),
            name: "rb".to_string(),
            token: "t".to_string(),
            status: "SLEEPING".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            Device::try_from(row),
            Err(GatewayError::PersistenceError(_))
        ));

        let ok = DeviceRow {
            id: Uuid::new_v4(),
            name: "rb".to_string(),
            token: "t".to_string(),
            status: "BUSY".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(Device::try_from(ok).ok().map(|d| d.status), Some(DeviceStatus::Busy));
    }
}
