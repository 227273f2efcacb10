//! Axum WebSocket upgrade handler for raybots.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::domain::DeviceId;
use crate::error::GatewayError;

/// Query string of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Device identity (UUID).
    #[serde(default)]
    pub id: Option<String>,
}

/// `GET /ws/raybots?id=<uuid>` — Upgrade a raybot connection.
///
/// Refuses before upgrading, with an empty body, when the id does not
/// parse (400), the raybot is unknown (404), or it already holds a live
/// session (409).
pub async fn raybot_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(device_id) = params.id.as_deref().and_then(|raw| raw.parse::<DeviceId>().ok()) else {
        tracing::info!(id = ?params.id, "invalid raybot id on connect");
        return StatusCode::BAD_REQUEST.into_response();
    };

    match state.hub.is_connected(device_id).await {
        Ok(false) => {}
        Ok(true) => {
            tracing::info!(device_id = %device_id, "raybot is already connected");
            return StatusCode::CONFLICT.into_response();
        }
        Err(e) => {
            tracing::error!(device_id = %device_id, error = %e, "hub unavailable");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    match state.device_service.get(device_id).await {
        Ok(_) => {}
        Err(GatewayError::DeviceNotFound(_)) => {
            tracing::info!(device_id = %device_id, "raybot not found");
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            tracing::error!(device_id = %device_id, error = %e, "failed to load raybot");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let hub = state.hub.clone();
    let ctx = state.session_context();
    ws.max_message_size(ctx.config.max_message_bytes)
        .on_failed_upgrade(move |e| {
            tracing::error!(device_id = %device_id, error = %e, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| hub.handle_connect(socket, device_id, ctx))
}
