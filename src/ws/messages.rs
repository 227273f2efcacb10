//! Wire protocol between a raybot and its session.
//!
//! ```text
//! Inbound:  { "op": "publish"|"response", "id"?: string, "topic"?: string, "data": any }
//! Outbound: { "id": string, "type": string, "data": any }
//! ```
//!
//! Anything a device sends that does not fit this shape is a
//! [`ProtocolViolation`], which always ends the session with a close
//! frame carrying [`ProtocolViolation::close_code`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Command, CommandId, CommandStatus, CommandType};
use crate::error::GatewayError;

/// Close code 1003: the device sent a kind of data we do not accept.
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
/// Close code 1007: the frame payload is inconsistent with the protocol.
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
/// Close code 1008: the connection breaks gateway policy.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code 1011: the gateway failed while handling the frame.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Envelope operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Unsolicited report routed by topic.
    Publish,
    /// Reply to a command the gateway sent.
    Response,
}

impl FromStr for Operation {
    type Err = ProtocolViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(Self::Publish),
            "response" => Ok(Self::Response),
            other => Err(ProtocolViolation::UnknownOperation(other.to_string())),
        }
    }
}

/// Topics a device may publish on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Device activity status (`IDLE` / `BUSY`).
    Status,
    /// Memory and CPU usage.
    RamCpu,
    /// Free-form device log line.
    Log,
    /// Battery readings.
    BatterySensor,
    /// Load cell readings.
    WeightSensor,
    /// Front distance sensor readings.
    ForwardDistanceSensor,
    /// Rear distance sensor readings.
    BackwardDistanceSensor,
    /// Drive motor state.
    MovementMotor,
    /// Lift motor state.
    LiftingMotor,
}

impl Topic {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::RamCpu => "ram_cpu",
            Self::Log => "log",
            Self::BatterySensor => "battery_sensor",
            Self::WeightSensor => "weight_sensor",
            Self::ForwardDistanceSensor => "forward_distance_sensor",
            Self::BackwardDistanceSensor => "backward_distance_sensor",
            Self::MovementMotor => "movement_motor",
            Self::LiftingMotor => "lifting_motor",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ProtocolViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Self::Status),
            "ram_cpu" => Ok(Self::RamCpu),
            "log" => Ok(Self::Log),
            "battery_sensor" => Ok(Self::BatterySensor),
            "weight_sensor" => Ok(Self::WeightSensor),
            "forward_distance_sensor" => Ok(Self::ForwardDistanceSensor),
            "backward_distance_sensor" => Ok(Self::BackwardDistanceSensor),
            "movement_motor" => Ok(Self::MovementMotor),
            "lifting_motor" => Ok(Self::LiftingMotor),
            other => Err(ProtocolViolation::UnknownTopic(other.to_string())),
        }
    }
}

/// Raw inbound envelope as it appears on the wire.
///
/// Fields are kept loose so [`Inbound::parse`] can name the exact
/// violation instead of failing with a generic decode error.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Operation name.
    pub op: String,
    /// Correlated command id, required for `response`.
    #[serde(default)]
    pub id: Option<String>,
    /// Topic name, required for `publish`.
    #[serde(default)]
    pub topic: Option<String>,
    /// Opaque payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Topic-routed report.
    Publish {
        /// Known topic.
        topic: Topic,
        /// Topic-specific payload.
        data: serde_json::Value,
    },
    /// Reply to an outstanding command.
    Response {
        /// Referenced command.
        id: CommandId,
        /// Reply payload; see [`ResponseData`].
        data: serde_json::Value,
    },
}

impl Inbound {
    /// Decodes and validates one frame.
    ///
    /// # Errors
    ///
    /// Returns the [`ProtocolViolation`] that should close the session.
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolViolation> {
        let envelope: Envelope = serde_json::from_slice(frame)
            .map_err(|e| ProtocolViolation::MalformedEnvelope(e.to_string()))?;

        match envelope.op.parse::<Operation>()? {
            Operation::Publish => {
                let topic = envelope.topic.ok_or(ProtocolViolation::MissingTopic)?;
                Ok(Self::Publish {
                    topic: topic.parse()?,
                    data: envelope.data,
                })
            }
            Operation::Response => {
                let raw = envelope.id.ok_or(ProtocolViolation::MissingId)?;
                let id = raw
                    .parse::<CommandId>()
                    .map_err(|_| ProtocolViolation::InvalidId(raw))?;
                Ok(Self::Response {
                    id,
                    data: envelope.data,
                })
            }
        }
    }
}

/// Command status as a device reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedStatus {
    /// Execution started.
    InProgress,
    /// Execution finished successfully.
    Success,
    /// Execution failed.
    Failed,
    /// Older firmware spelling of `FAILED`.
    Error,
}

impl From<ReportedStatus> for CommandStatus {
    fn from(reported: ReportedStatus) -> Self {
        match reported {
            ReportedStatus::InProgress => Self::InProgress,
            ReportedStatus::Success => Self::Success,
            ReportedStatus::Failed | ReportedStatus::Error => Self::Failed,
        }
    }
}

/// `data` of a `response` frame. Extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponseData {
    /// Reported execution status.
    pub status: ReportedStatus,
    /// Failure reason, when the device supplies one.
    #[serde(default)]
    pub reason: Option<String>,
}

impl ResponseData {
    /// Decodes the payload of a `response` frame.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation::InvalidResponse`] if there is no recognizable
    /// status.
    pub fn from_value(data: serde_json::Value) -> Result<Self, ProtocolViolation> {
        serde_json::from_value(data).map_err(|e| ProtocolViolation::InvalidResponse(e.to_string()))
    }
}

/// `data` of a `status` publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StatusReport {
    /// Status the device claims to be in.
    pub status: ReportedDeviceStatus,
}

/// Device statuses a raybot may report about itself. `OFFLINE` is owned
/// by the session lifecycle and cannot be self-reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedDeviceStatus {
    /// Not executing anything.
    Idle,
    /// Executing a command.
    Busy,
}

/// `data` of a `ram_cpu` publish.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RamCpuReport {
    /// Memory usage in percent.
    pub ram_usage: f64,
    /// CPU usage in percent.
    pub cpu_usage: f64,
}

/// Command frame sent to a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundCommand<'a> {
    /// Command id the device must echo in its responses.
    pub id: CommandId,
    /// Command type.
    #[serde(rename = "type")]
    pub command_type: CommandType,
    /// Command parameters.
    pub data: &'a serde_json::Value,
}

impl<'a> From<&'a Command> for OutboundCommand<'a> {
    fn from(command: &'a Command) -> Self {
        Self {
            id: command.id,
            command_type: command.command_type,
            data: &command.inputs,
        }
    }
}

impl OutboundCommand<'_> {
    /// Serializes the frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if serialization fails.
    pub fn to_json(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self)
            .map_err(|e| GatewayError::Internal(format!("encode outbound command: {e}")))
    }
}

/// Reasons a session is closed because of what the device sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// The frame is not a JSON envelope.
    #[error("invalid message: {0}")]
    MalformedEnvelope(String),

    /// `op` is neither `publish` nor `response`.
    #[error("invalid operation: {0}")]
    UnknownOperation(String),

    /// `publish` without `topic`.
    #[error("missing topic")]
    MissingTopic,

    /// `publish` on a topic outside [`Topic`].
    #[error("unsupported topic: {0}")]
    UnknownTopic(String),

    /// A known topic carried a payload of the wrong shape.
    #[error("invalid {topic} payload: {reason}")]
    InvalidPublish {
        /// Topic the payload arrived on.
        topic: Topic,
        /// Decoder message.
        reason: String,
    },

    /// `response` without `id`.
    #[error("missing id")]
    MissingId,

    /// `id` is not a command identifier.
    #[error("failed to parse id: {0}")]
    InvalidId(String),

    /// `id` does not reference a command in flight on this session.
    #[error("command not found: {0}")]
    UnknownCommand(CommandId),

    /// `response` data lacks a recognizable status.
    #[error("invalid response data: {0}")]
    InvalidResponse(String),

    /// The reported status is not reachable from the current one.
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Stored status.
        from: CommandStatus,
        /// Reported status.
        to: CommandStatus,
    },

    /// The gateway failed while handling the frame.
    #[error("internal server error")]
    Internal,
}

impl ProtocolViolation {
    /// WebSocket close code to send to the device.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Self::UnknownTopic(_) => CLOSE_UNSUPPORTED_DATA,
            Self::Internal => CLOSE_INTERNAL_ERROR,
            Self::MalformedEnvelope(_)
            | Self::UnknownOperation(_)
            | Self::MissingTopic
            | Self::InvalidPublish { .. }
            | Self::MissingId
            | Self::InvalidId(_)
            | Self::UnknownCommand(_)
            | Self::InvalidResponse(_)
            | Self::IllegalTransition { .. } => CLOSE_INVALID_PAYLOAD,
        }
    }

    /// Close reason text. Control frames carry at most 123 bytes of
    /// reason, so long decoder messages are cut on a char boundary.
    #[must_use]
    pub fn reason(&self) -> String {
        truncate_reason(self.to_string())
    }
}

/// Failure to enqueue an outbound frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The outbound queue is at capacity; the peer is considered stalled.
    #[error("outbound queue full")]
    QueueFull,
    /// The session has already been closed.
    #[error("session closed")]
    Closed,
    /// The command could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

const MAX_CLOSE_REASON: usize = 123;

pub(crate) fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::DeviceId;

    #[test]
    fn parses_publish_with_known_topic() {
        let frame = br#"{"op":"publish","topic":"ram_cpu","data":{"ram_usage":1.5,"cpu_usage":2}}"#;
        let Ok(Inbound::Publish { topic, data }) = Inbound::parse(frame) else {
            panic!("expected publish");
        };
        assert_eq!(topic, Topic::RamCpu);
        assert_eq!(data["cpu_usage"], 2);
    }

    #[test]
    fn unknown_topic_is_unsupported_data() {
        let frame = br#"{"op":"publish","topic":"camera","data":{}}"#;
        let Err(violation) = Inbound::parse(frame) else {
            panic!("camera is not a topic");
        };
        assert_eq!(violation, ProtocolViolation::UnknownTopic("camera".to_string()));
        assert_eq!(violation.close_code(), CLOSE_UNSUPPORTED_DATA);
    }

    #[test]
    fn response_requires_parseable_id() {
        let missing = Inbound::parse(br#"{"op":"response","data":{}}"#);
        assert_eq!(missing, Err(ProtocolViolation::MissingId));

        let Err(bad) = Inbound::parse(br#"{"op":"response","id":"c1","data":{}}"#) else {
            panic!("c1 is not a uuid");
        };
        assert_eq!(bad.close_code(), CLOSE_INVALID_PAYLOAD);
        assert_eq!(bad.reason(), "failed to parse id: c1");
    }

    #[test]
    fn parses_response() {
        let id = CommandId::new();
        let frame = format!(r#"{{"op":"response","id":"{id}","data":{{"status":"SUCCESS"}}}}"#);
        let Ok(Inbound::Response { id: parsed, data }) = Inbound::parse(frame.as_bytes()) else {
            panic!("expected response");
        };
        assert_eq!(parsed, id);
        let Ok(reply) = ResponseData::from_value(data) else {
            panic!("expected a status");
        };
        assert_eq!(reply.status, ReportedStatus::Success);
    }

    #[test]
    fn bad_operation_and_garbage_are_invalid_payload() {
        let Err(op) = Inbound::parse(br#"{"op":"subscribe","data":{}}"#) else {
            panic!("subscribe is not an operation");
        };
        assert_eq!(op.close_code(), CLOSE_INVALID_PAYLOAD);
        assert_eq!(op.reason(), "invalid operation: subscribe");

        let Err(garbage) = Inbound::parse(b"\x00not json") else {
            panic!("garbage parsed");
        };
        assert!(matches!(garbage, ProtocolViolation::MalformedEnvelope(_)));
    }

    #[test]
    fn reported_error_maps_to_failed() {
        let Ok(reply) = ResponseData::from_value(serde_json::json!({
            "status": "ERROR",
            "reason": "obstacle",
            "extra": 1
        })) else {
            panic!("ERROR is a valid report");
        };
        assert_eq!(CommandStatus::from(reply.status), CommandStatus::Failed);
        assert_eq!(reply.reason.as_deref(), Some("obstacle"));

        assert!(ResponseData::from_value(serde_json::json!({"status": "PENDING"})).is_err());
        assert!(ResponseData::from_value(serde_json::json!("SUCCESS")).is_err());
    }

    #[test]
    fn outbound_command_uses_inputs_as_data() {
        let cmd = Command::new(DeviceId::new(), CommandType::MoveForward)
            .with_inputs(serde_json::json!({"speed": 2}));
        let Ok(json) = OutboundCommand::from(&cmd).to_json() else {
            panic!("encode failed");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&json) else {
            panic!("invalid json");
        };
        assert_eq!(
            value,
            serde_json::json!({
                "id": cmd.id.to_string(),
                "type": "MOVE_FORWARD",
                "data": {"speed": 2}
            })
        );
    }

    #[test]
    fn long_reasons_are_truncated() {
        let violation = ProtocolViolation::MalformedEnvelope("é".repeat(200));
        assert!(violation.reason().len() <= 123);
    }
}
