//! Bus events emitted by the command service.

use serde::{Deserialize, Serialize};

use super::Command;

/// Topic carrying a full [`Command`] snapshot after creation.
pub const COMMAND_CREATED_TOPIC: &str = "command.created";

/// Payload of [`COMMAND_CREATED_TOPIC`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandCreated(pub Command);

impl CommandCreated {
    /// Serializes the event for the bus.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes an event, ignoring unknown fields.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload is not a command
    /// snapshot.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Unwraps the command snapshot.
    #[must_use]
    pub fn into_command(self) -> Command {
        self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{CommandType, DeviceId};

    #[test]
    fn encode_decode_preserves_snapshot() {
        let cmd = Command::new(DeviceId::new(), CommandType::MoveToLocation);
        let event = CommandCreated(cmd.clone());
        let Ok(bytes) = event.encode() else {
            panic!("encode failed");
        };
        let Ok(decoded) = CommandCreated::decode(&bytes) else {
            panic!("decode failed");
        };
        assert_eq!(decoded.into_command(), cmd);
    }

    #[test]
    fn decode_rejects_foreign_payload() {
        assert!(CommandCreated::decode(b"{\"raybot\":\"x\"}").is_err());
        assert!(CommandCreated::decode(b"not json").is_err());
    }
}
