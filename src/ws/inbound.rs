//! Handling of frames received from a raybot.

use serde::de::DeserializeOwned;

use super::messages::{
    Inbound, ProtocolViolation, RamCpuReport, ReportedDeviceStatus, ResponseData, StatusReport,
    Topic,
};
use super::session::DeviceSession;
use crate::domain::{CommandId, CommandStatus, DeviceTransition};
use crate::error::GatewayError;

/// Decodes one frame and applies it to the session.
///
/// # Errors
///
/// Returns the [`ProtocolViolation`] that must close the session.
pub async fn dispatch(session: &DeviceSession, frame: &[u8]) -> Result<(), ProtocolViolation> {
    match Inbound::parse(frame)? {
        Inbound::Publish { topic, data } => handle_publish(session, topic, data).await,
        Inbound::Response { id, data } => handle_response(session, id, data).await,
    }
}

fn decode<T: DeserializeOwned>(topic: Topic, data: serde_json::Value) -> Result<T, ProtocolViolation> {
    serde_json::from_value(data).map_err(|e| ProtocolViolation::InvalidPublish {
        topic,
        reason: e.to_string(),
    })
}

async fn handle_publish(
    session: &DeviceSession,
    topic: Topic,
    data: serde_json::Value,
) -> Result<(), ProtocolViolation> {
    let device_id = session.device_id();
    match topic {
        Topic::Status => {
            let report: StatusReport = decode(topic, data)?;
            let transition = match report.status {
                ReportedDeviceStatus::Busy => DeviceTransition::StartWorking,
                ReportedDeviceStatus::Idle => DeviceTransition::StopWorking,
            };
            set_device_status(session, transition).await;
        }
        Topic::RamCpu => {
            let report: RamCpuReport = decode(topic, data)?;
            tracing::debug!(
                device_id = %device_id,
                ram_usage = report.ram_usage,
                cpu_usage = report.cpu_usage,
                "ram/cpu report"
            );
        }
        Topic::Log => {
            tracing::info!(device_id = %device_id, %data, "raybot log");
        }
        Topic::BatterySensor
        | Topic::WeightSensor
        | Topic::ForwardDistanceSensor
        | Topic::BackwardDistanceSensor
        | Topic::MovementMotor
        | Topic::LiftingMotor => {
            tracing::debug!(device_id = %device_id, %topic, %data, "telemetry");
        }
    }
    Ok(())
}

async fn handle_response(
    session: &DeviceSession,
    id: CommandId,
    data: serde_json::Value,
) -> Result<(), ProtocolViolation> {
    let device_id = session.device_id();
    let Some(tracked) = session.in_flight(id) else {
        tracing::error!(device_id = %device_id, command_id = %id, "response for command not in flight");
        return Err(ProtocolViolation::UnknownCommand(id));
    };
    let reply = ResponseData::from_value(data)?;
    let next = CommandStatus::from(reply.status);

    let command = match session.context().commands.advance(id, next).await {
        Ok(command) => command,
        Err(GatewayError::CommandNotFound(_)) => {
            session.forget(id);
            tracing::error!(device_id = %device_id, command_id = %id, "command no longer exists");
            return Err(ProtocolViolation::UnknownCommand(id));
        }
        Err(GatewayError::InvalidTransition { from, to }) => {
            return Err(ProtocolViolation::IllegalTransition { from, to });
        }
        Err(e) => {
            tracing::error!(device_id = %device_id, command_id = %id, error = %e, "failed to advance command");
            return Err(ProtocolViolation::Internal);
        }
    };

    if command.status == tracked.status {
        tracing::debug!(command_id = %id, status = %command.status, "duplicate response ignored");
        return Ok(());
    }
    session.settle(&command);

    match command.status {
        CommandStatus::InProgress => set_device_status(session, DeviceTransition::StartWorking).await,
        CommandStatus::Success => {
            tracing::info!(device_id = %device_id, command_id = %id, "command succeeded");
            if !session.any_in_progress() {
                set_device_status(session, DeviceTransition::StopWorking).await;
            }
        }
        CommandStatus::Failed => {
            tracing::warn!(
                device_id = %device_id,
                command_id = %id,
                reason = reply.reason.as_deref().unwrap_or("unspecified"),
                "command failed"
            );
            if !session.any_in_progress() {
                set_device_status(session, DeviceTransition::StopWorking).await;
            }
        }
        CommandStatus::Pending => {}
    }
    Ok(())
}

async fn set_device_status(session: &DeviceSession, transition: DeviceTransition) {
    match session.transition(transition).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::debug!(
                device_id = %session.device_id(),
                ?transition,
                "session closed, status left alone"
            );
        }
        Err(e) => {
            tracing::error!(
                device_id = %session.device_id(),
                ?transition,
                error = %e,
                "failed to update raybot status"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{Command, CommandType, DeviceId, DeviceStatus};
    use crate::ws::messages::{CLOSE_INVALID_PAYLOAD, CLOSE_UNSUPPORTED_DATA};
    use crate::ws::session::SessionContext;
    use crate::ws::session::tests::make_context;

    struct Fixture {
        ctx: SessionContext,
        device_id: DeviceId,
        session: Arc<DeviceSession>,
        _rx: tokio::sync::mpsc::Receiver<String>,
    }

    async fn fixture() -> Fixture {
        let (ctx, device_id) = make_context(8).await;
        let Ok((session, rx)) = DeviceSession::open(device_id, ctx.clone()).await else {
            panic!("open failed");
        };
        let Ok(()) = session.activate().await else {
            panic!("activate failed");
        };
        Fixture {
            ctx,
            device_id,
            session,
            _rx: rx,
        }
    }

    async fn deliver(fx: &Fixture, command_type: CommandType) -> Command {
        let Ok(cmd) = fx
            .ctx
            .commands
            .create(fx.device_id, command_type, serde_json::Value::Null)
            .await
        else {
            panic!("create failed");
        };
        let Ok(()) = fx.session.send(&cmd) else {
            panic!("send failed");
        };
        cmd
    }

    fn response(id: CommandId, status: &str) -> Vec<u8> {
        serde_json::json!({"op": "response", "id": id.to_string(), "data": {"status": status}})
            .to_string()
            .into_bytes()
    }

    async fn device_status(fx: &Fixture) -> DeviceStatus {
        let Ok(device) = fx.ctx.devices.get(fx.device_id).await else {
            panic!("device missing");
        };
        device.status
    }

    async fn command_status(fx: &Fixture, id: CommandId) -> CommandStatus {
        let Ok(cmd) = fx.ctx.commands.get(id).await else {
            panic!("command missing");
        };
        cmd.status
    }

    #[tokio::test]
    async fn full_lifecycle_couples_device_status() {
        let fx = fixture().await;
        let cmd = deliver(&fx, CommandType::MoveForward).await;

        assert!(dispatch(&fx.session, &response(cmd.id, "IN_PROGRESS")).await.is_ok());
        assert_eq!(command_status(&fx, cmd.id).await, CommandStatus::InProgress);
        assert_eq!(device_status(&fx).await, DeviceStatus::Busy);

        assert!(dispatch(&fx.session, &response(cmd.id, "IN_PROGRESS")).await.is_ok());

        assert!(dispatch(&fx.session, &response(cmd.id, "SUCCESS")).await.is_ok());
        assert_eq!(command_status(&fx, cmd.id).await, CommandStatus::Success);
        assert_eq!(device_status(&fx).await, DeviceStatus::Idle);
        assert!(fx.session.in_flight(cmd.id).is_none());
    }

    #[tokio::test]
    async fn error_report_fails_command() {
        let fx = fixture().await;
        let cmd = deliver(&fx, CommandType::MoveToLocation).await;
        assert!(dispatch(&fx.session, &response(cmd.id, "IN_PROGRESS")).await.is_ok());
        assert!(dispatch(&fx.session, &response(cmd.id, "ERROR")).await.is_ok());
        assert_eq!(command_status(&fx, cmd.id).await, CommandStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_id_closes_without_mutation() {
        let fx = fixture().await;
        let cmd = deliver(&fx, CommandType::MoveForward).await;
        let stranger = CommandId::new();

        let Err(violation) = dispatch(&fx.session, &response(stranger, "SUCCESS")).await else {
            panic!("unknown id accepted");
        };
        assert_eq!(violation, ProtocolViolation::UnknownCommand(stranger));
        assert_eq!(violation.close_code(), CLOSE_INVALID_PAYLOAD);
        assert_eq!(command_status(&fx, cmd.id).await, CommandStatus::Pending);
    }

    #[tokio::test]
    async fn skipping_in_progress_is_illegal_and_writes_nothing() {
        let fx = fixture().await;
        let cmd = deliver(&fx, CommandType::MoveBackward).await;

        let Err(violation) = dispatch(&fx.session, &response(cmd.id, "SUCCESS")).await else {
            panic!("PENDING -> SUCCESS accepted");
        };
        assert_eq!(
            violation,
            ProtocolViolation::IllegalTransition {
                from: CommandStatus::Pending,
                to: CommandStatus::Success,
            }
        );
        assert_eq!(command_status(&fx, cmd.id).await, CommandStatus::Pending);
    }

    #[tokio::test]
    async fn unrecognized_reported_status_is_invalid_payload() {
        let fx = fixture().await;
        let cmd = deliver(&fx, CommandType::Stop).await;
        let Err(violation) = dispatch(&fx.session, &response(cmd.id, "DONE")).await else {
            panic!("DONE accepted");
        };
        assert!(matches!(violation, ProtocolViolation::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn status_publish_updates_device() {
        let fx = fixture().await;
        let frame = br#"{"op":"publish","topic":"status","data":{"status":"BUSY"}}"#;
        assert!(dispatch(&fx.session, frame).await.is_ok());
        assert_eq!(device_status(&fx).await, DeviceStatus::Busy);

        let idle = br#"{"op":"publish","topic":"status","data":{"status":"IDLE"}}"#;
        assert!(dispatch(&fx.session, idle).await.is_ok());
        assert_eq!(device_status(&fx).await, DeviceStatus::Idle);

        let bad = br#"{"op":"publish","topic":"status","data":{"status":"OFFLINE"}}"#;
        let Err(violation) = dispatch(&fx.session, bad).await else {
            panic!("self-reported OFFLINE accepted");
        };
        assert_eq!(violation.close_code(), CLOSE_INVALID_PAYLOAD);
    }

    #[tokio::test]
    async fn status_publish_after_close_keeps_device_offline() {
        let fx = fixture().await;
        fx.session.close().await;

        let frame = br#"{"op":"publish","topic":"status","data":{"status":"BUSY"}}"#;
        assert!(dispatch(&fx.session, frame).await.is_ok());
        assert_eq!(device_status(&fx).await, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn status_publish_cannot_wake_an_offline_device() {
        let fx = fixture().await;
        let disconnected = fx
            .ctx
            .devices
            .transition(fx.device_id, DeviceTransition::Disconnect)
            .await;
        assert!(disconnected.is_ok());

        let frame = br#"{"op":"publish","topic":"status","data":{"status":"BUSY"}}"#;
        assert!(dispatch(&fx.session, frame).await.is_ok());
        assert_eq!(device_status(&fx).await, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn completion_racing_close_cannot_revive_the_device() {
        let fx = fixture().await;
        let cmd = deliver(&fx, CommandType::MoveForward).await;
        assert!(dispatch(&fx.session, &response(cmd.id, "IN_PROGRESS")).await.is_ok());

        let success = response(cmd.id, "SUCCESS");
        let (_reply, ()) = tokio::join!(
            dispatch(&fx.session, &success),
            fx.session.close()
        );
        assert_eq!(device_status(&fx).await, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn telemetry_is_accepted_and_unknown_topic_is_unsupported() {
        let fx = fixture().await;
        let telemetry = br#"{"op":"publish","topic":"battery_sensor","data":{"voltage":12.1}}"#;
        assert!(dispatch(&fx.session, telemetry).await.is_ok());

        let ram = br#"{"op":"publish","topic":"ram_cpu","data":{"ram_usage":"high"}}"#;
        assert!(matches!(
            dispatch(&fx.session, ram).await,
            Err(ProtocolViolation::InvalidPublish { topic: Topic::RamCpu, .. })
        ));

        let unknown = br#"{"op":"publish","topic":"lidar","data":{}}"#;
        let Err(violation) = dispatch(&fx.session, unknown).await else {
            panic!("lidar accepted");
        };
        assert_eq!(violation.close_code(), CLOSE_UNSUPPORTED_DATA);
    }
}
