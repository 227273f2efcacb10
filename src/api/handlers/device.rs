//! Raybot handlers: register, list, get, delete, command history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CommandDto, CreateRaybotRequest, CreateRaybotResponse, PaginationParams, RaybotDto,
    RaybotListResponse,
};
use crate::app_state::AppState;
use crate::domain::DeviceId;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /raybots` — Register a raybot.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a blank name.
#[utoipa::path(
    post,
    path = "/api/v1/raybots",
    tag = "Raybots",
    summary = "Register a raybot",
    description = "Registers a new raybot in the OFFLINE state and issues its bearer token.",
    request_body = CreateRaybotRequest,
    responses(
        (status = 201, description = "Raybot registered", body = CreateRaybotResponse),
        (status = 400, description = "Invalid name", body = ErrorResponse),
    )
)]
pub async fn create_raybot(
    State(state): State<AppState>,
    Json(req): Json<CreateRaybotRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let device = state.device_service.register(&req.name).await?;
    Ok((StatusCode::CREATED, Json(CreateRaybotResponse::from(device))))
}

/// `GET /raybots` — List raybots with pagination.
///
/// # Errors
///
/// Returns [`GatewayError`] on store failures.
#[utoipa::path(
    get,
    path = "/api/v1/raybots",
    tag = "Raybots",
    summary = "List raybots",
    description = "Returns a paginated list of registered raybots, oldest first.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated raybot list", body = RaybotListResponse),
    )
)]
pub async fn list_raybots(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let devices = state.device_service.list().await?;
    let (page, pagination) = params.paginate(devices);
    Ok(Json(RaybotListResponse {
        data: page.into_iter().map(RaybotDto::from).collect(),
        pagination,
    }))
}

/// `GET /raybots/{id}` — Get one raybot.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] if the raybot does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/raybots/{id}",
    tag = "Raybots",
    summary = "Get raybot",
    params(
        ("id" = uuid::Uuid, Path, description = "Raybot UUID"),
    ),
    responses(
        (status = 200, description = "Raybot details", body = RaybotDto),
        (status = 404, description = "Raybot not found", body = ErrorResponse),
    )
)]
pub async fn get_raybot(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let device = state.device_service.get(DeviceId::from_uuid(id)).await?;
    Ok(Json(RaybotDto::from(device)))
}

/// `DELETE /raybots/{id}` — Delete a raybot.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] if the raybot does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/raybots/{id}",
    tag = "Raybots",
    summary = "Delete raybot",
    params(
        ("id" = uuid::Uuid, Path, description = "Raybot UUID"),
    ),
    responses(
        (status = 204, description = "Raybot deleted"),
        (status = 404, description = "Raybot not found", body = ErrorResponse),
    )
)]
pub async fn delete_raybot(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    state.device_service.delete(DeviceId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /raybots/{id}/commands` — Commands addressed to a raybot.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] if the raybot does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/raybots/{id}/commands",
    tag = "Raybots",
    summary = "List raybot commands",
    description = "Returns every command addressed to the raybot, oldest first.",
    params(
        ("id" = uuid::Uuid, Path, description = "Raybot UUID"),
    ),
    responses(
        (status = 200, description = "Command history", body = Vec<CommandDto>),
        (status = 404, description = "Raybot not found", body = ErrorResponse),
    )
)]
pub async fn list_raybot_commands(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let device_id = DeviceId::from_uuid(id);
    state.device_service.get(device_id).await?;
    let commands = state.command_service.list_by_device(device_id).await?;
    Ok(Json(
        commands
            .into_iter()
            .map(CommandDto::from)
            .collect::<Vec<_>>(),
    ))
}

/// Raybot routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/raybots", post(create_raybot).get(list_raybots))
        .route("/raybots/{id}", get(get_raybot).delete(delete_raybot))
        .route("/raybots/{id}/commands", get(list_raybot_commands))
}
