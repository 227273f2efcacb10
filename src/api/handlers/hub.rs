//! Hub introspection.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::SessionListResponse;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /hub/sessions` — Raybots holding a live session.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] if the hub has stopped.
#[utoipa::path(
    get,
    path = "/api/v1/hub/sessions",
    tag = "Hub",
    summary = "List live sessions",
    responses(
        (status = 200, description = "Connected raybots", body = SessionListResponse),
        (status = 500, description = "Hub stopped", body = ErrorResponse),
    )
)]
pub async fn list_sessions(State(state): State<AppState>) -> Result<impl IntoResponse, GatewayError> {
    let mut raybot_ids = state.hub.connected_devices().await?;
    raybot_ids.sort_by_key(|id| *id.as_uuid());
    Ok(Json(SessionListResponse {
        count: raybot_ids.len(),
        raybot_ids,
    }))
}

/// Hub routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/hub/sessions", get(list_sessions))
}
