//! raybot-gateway server entry point.
//!
//! Wires stores, services, the hub and the event bridge, then serves the
//! REST and WebSocket endpoints until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use raybot_gateway::api;
use raybot_gateway::app_state::AppState;
use raybot_gateway::config::{GatewayConfig, LogFormat};
use raybot_gateway::domain::EventBus;
use raybot_gateway::persistence::{
    CommandStore, DeviceStore, MemoryCommandStore, MemoryDeviceStore, PostgresCommandStore,
    PostgresDeviceStore, postgres,
};
use raybot_gateway::service::{CommandService, DeviceService};
use raybot_gateway::ws::{Hub, bridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting raybot-gateway");

    // Build persistence layer
    let (commands, devices): (Arc<dyn CommandStore>, Arc<dyn DeviceStore>) =
        if config.persistence_enabled {
            let pool = postgres::connect(&config)
                .await
                .context("connecting to PostgreSQL")?;
            (
                Arc::new(PostgresCommandStore::new(pool.clone())),
                Arc::new(PostgresDeviceStore::new(pool)),
            )
        } else {
            tracing::warn!("PERSISTENCE_ENABLED is false, using in-memory stores");
            (
                Arc::new(MemoryCommandStore::new()),
                Arc::new(MemoryDeviceStore::new()),
            )
        };

    // Build domain and service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let device_service = DeviceService::new(Arc::clone(&devices));
    let command_service =
        CommandService::new(commands, devices, Arc::new(event_bus.clone()));

    // Start the hub and the event bridge
    let (hub, hub_task) = Hub::spawn(config.hub_mailbox_capacity);
    let bridge_task = bridge::spawn(&event_bus, hub.clone());

    let app_state = AppState {
        command_service,
        device_service,
        hub: hub.clone(),
        event_bus: event_bus.clone(),
        session_config: config.session,
    };
    let app = api::build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let shutdown = async move {
        shutdown_signal().await;
        // Stop publishing, then close every session
        tracing::info!("shutting down");
        event_bus.close();
        if let Err(e) = hub.shutdown().await {
            tracing::warn!(error = %e, "hub already stopped");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("serving HTTP")?;

    let _ = bridge_task.await;
    let _ = hub_task.await;
    tracing::info!("raybot-gateway stopped");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
