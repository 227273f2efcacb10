//! OpenAPI document for the REST surface.
//!
//! Served as Swagger UI at `/swagger-ui` with the raw document at
//! `/api-docs/openapi.json` when the `swagger-ui` feature is enabled.

use utoipa::OpenApi;

use crate::api::dto::{
    CommandDto, CreateCommandRequest, CreateRaybotRequest, CreateRaybotResponse, PaginationMeta,
    RaybotDto, RaybotListResponse, SessionListResponse,
};
use crate::api::handlers::{command, device, hub, system};
use crate::domain::{CommandStatus, CommandType, DeviceStatus};
use crate::error::{ErrorBody, ErrorResponse};

/// raybot-gateway OpenAPI documentation.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "raybot-gateway",
        description = "Command dispatch and live session hub for raybots. Raybots connect at `GET /ws/raybots?id=<uuid>`."
    ),
    paths(
        device::create_raybot,
        device::list_raybots,
        device::get_raybot,
        device::delete_raybot,
        device::list_raybot_commands,
        command::create_command,
        command::get_command,
        command::delete_command,
        hub::list_sessions,
        system::health_handler,
    ),
    components(schemas(
        CreateRaybotRequest,
        CreateRaybotResponse,
        RaybotDto,
        RaybotListResponse,
        PaginationMeta,
        CreateCommandRequest,
        CommandDto,
        SessionListResponse,
        CommandType,
        CommandStatus,
        DeviceStatus,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Raybots", description = "Raybot registration"),
        (name = "Commands", description = "Command creation and history"),
        (name = "Hub", description = "Live session registry"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Swagger UI serving [`ApiDoc`].
#[cfg(feature = "swagger-ui")]
#[must_use]
pub fn swagger_ui() -> utoipa_swagger_ui::SwaggerUi {
    utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
}
