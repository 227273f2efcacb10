//! Command handlers: create, get, delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{CommandDto, CreateCommandRequest};
use crate::app_state::AppState;
use crate::domain::CommandId;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /commands` — Create a command and dispatch it to its raybot.
///
/// Delivery is asynchronous: a `201` only means the command was stored
/// and announced. A raybot without a live session keeps it `PENDING`.
///
/// # Errors
///
/// - [`GatewayError::DeviceNotFound`] if the raybot does not exist.
/// - [`GatewayError::PublishFailed`] if the command was stored but could
///   not be announced.
#[utoipa::path(
    post,
    path = "/api/v1/commands",
    tag = "Commands",
    summary = "Create a command",
    description = "Persists a PENDING command and publishes command.created for delivery to the raybot's live session.",
    request_body = CreateCommandRequest,
    responses(
        (status = 201, description = "Command created", body = CommandDto),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Raybot not found", body = ErrorResponse),
        (status = 503, description = "Command stored but not published", body = ErrorResponse),
    )
)]
pub async fn create_command(
    State(state): State<AppState>,
    Json(req): Json<CreateCommandRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let command = state
        .command_service
        .create(req.raybot_id, req.command_type, req.inputs)
        .await?;
    Ok((StatusCode::CREATED, Json(CommandDto::from(command))))
}

/// `GET /commands/{id}` — Get one command.
///
/// # Errors
///
/// Returns [`GatewayError::CommandNotFound`] if the command does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/commands/{id}",
    tag = "Commands",
    summary = "Get command",
    params(
        ("id" = uuid::Uuid, Path, description = "Command UUID"),
    ),
    responses(
        (status = 200, description = "Command details", body = CommandDto),
        (status = 404, description = "Command not found", body = ErrorResponse),
    )
)]
pub async fn get_command(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let command = state.command_service.get(CommandId::from_uuid(id)).await?;
    Ok(Json(CommandDto::from(command)))
}

/// `DELETE /commands/{id}` — Delete a command regardless of its status.
///
/// # Errors
///
/// Returns [`GatewayError::CommandNotFound`] if the command does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/commands/{id}",
    tag = "Commands",
    summary = "Delete command",
    params(
        ("id" = uuid::Uuid, Path, description = "Command UUID"),
    ),
    responses(
        (status = 204, description = "Command deleted"),
        (status = 404, description = "Command not found", body = ErrorResponse),
    )
)]
pub async fn delete_command(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    state.command_service.delete(CommandId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Command routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/commands", post(create_command))
        .route("/commands/{id}", get(get_command).delete(delete_command))
}
