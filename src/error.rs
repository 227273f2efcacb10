//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for stores, services and
//! handlers. Each variant maps to a specific HTTP status code and a
//! structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{CommandId, CommandStatus, DeviceId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "command not found: 7c1e...",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the table on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server          | 500 / 503                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Command with the given ID was not found.
    #[error("command not found: {0}")]
    CommandNotFound(CommandId),

    /// Device with the given ID was not found.
    #[error("raybot not found: {0}")]
    DeviceNotFound(DeviceId),

    /// A device with the given ID is already registered.
    #[error("raybot already exists: {0}")]
    DeviceAlreadyExists(DeviceId),

    /// The device already holds a live session.
    #[error("raybot already connected: {0}")]
    DeviceAlreadyConnected(DeviceId),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The command state machine rejected a status change.
    #[error("invalid command transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: CommandStatus,
        /// Requested status.
        to: CommandStatus,
    },

    /// The event bus refused a publication.
    #[error("event publication failed: {0}")]
    PublishFailed(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::CommandNotFound(_) => 2001,
            Self::DeviceNotFound(_) => 2002,
            Self::DeviceAlreadyExists(_) => 2003,
            Self::DeviceAlreadyConnected(_) => 2004,
            Self::InvalidTransition { .. } => 2005,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::PublishFailed(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::CommandNotFound(_) | Self::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            Self::DeviceAlreadyExists(_)
            | Self::DeviceAlreadyConnected(_)
            | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PublishFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns `true` for the not-found variants.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::CommandNotFound(_) | Self::DeviceNotFound(_))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = GatewayError::CommandNotFound(CommandId::new());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), 2001);
        assert!(err.is_not_found());
    }

    #[test]
    fn publish_failure_is_a_server_error() {
        let err = GatewayError::PublishFailed("bus closed".to_string());
        assert!(err.status_code().is_server_error());
        assert!(!err.is_not_found());
    }

    #[test]
    fn transition_message_names_both_states() {
        let err = GatewayError::InvalidTransition {
            from: CommandStatus::Success,
            to: CommandStatus::InProgress,
        };
        assert_eq!(
            err.to_string(),
            "invalid command transition: SUCCESS -> IN_PROGRESS"
        );
    }

    #[test]
    fn into_response_carries_status() {
        let response = GatewayError::DeviceAlreadyConnected(DeviceId::new()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
