//! Event bridge from `command.created` to the hub.

use tokio::task::JoinHandle;

use super::hub::HubHandle;
use crate::domain::{COMMAND_CREATED_TOPIC, CommandCreated, EventBus, Subscription};

/// Subscribes to [`COMMAND_CREATED_TOPIC`] and spawns the forwarding task.
///
/// The subscription is taken before this returns, so every command created
/// afterwards is seen by the bridge.
#[must_use]
pub fn spawn(bus: &EventBus, hub: HubHandle) -> JoinHandle<()> {
    let subscription = bus.subscribe(COMMAND_CREATED_TOPIC);
    tokio::spawn(run(subscription, hub))
}

/// Forwards every decodable event to [`HubHandle::deliver`] until the bus
/// closes or the hub stops. Undecodable events are logged and dropped.
pub async fn run(mut subscription: Subscription, hub: HubHandle) {
    tracing::info!(topic = subscription.topic(), "event bridge started");

    while let Some(payload) = subscription.recv().await {
        let command = match CommandCreated::decode(&payload) {
            Ok(event) => event.into_command(),
            Err(e) => {
                tracing::error!(
                    topic = subscription.topic(),
                    error = %e,
                    "dropping undecodable event"
                );
                continue;
            }
        };

        tracing::debug!(
            command_id = %command.id,
            device_id = %command.device_id,
            "forwarding command to hub"
        );
        if let Err(e) = hub.deliver(command).await {
            tracing::warn!(error = %e, "hub unavailable, event bridge stopping");
            break;
        }
    }

    tracing::info!("event bridge stopped");
}
