//! Raybot DTOs: registration, detail, and listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::PaginationMeta;
use crate::domain::{Device, DeviceId, DeviceStatus};

/// Request body for `POST /api/v1/raybots`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRaybotRequest {
    /// Human-readable name. Must not be blank.
    pub name: String,
}

/// Response body for `POST /api/v1/raybots`. The only response that
/// carries the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateRaybotResponse {
    /// Registered raybot.
    #[serde(flatten)]
    pub raybot: RaybotDto,
    /// Bearer token issued at registration.
    pub token: String,
}

/// Public view of a raybot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RaybotDto {
    /// Raybot identifier.
    pub id: DeviceId,
    /// Human-readable name.
    pub name: String,
    /// Current activity status.
    pub status: DeviceStatus,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl From<Device> for RaybotDto {
    fn from(device: Device) -> Self {
        Self {
            id: device.id,
            name: device.name,
            status: device.status,
            created_at: device.created_at,
            updated_at: device.updated_at,
        }
    }
}

impl From<Device> for CreateRaybotResponse {
    fn from(mut device: Device) -> Self {
        let token = std::mem::take(&mut device.token);
        Self {
            raybot: RaybotDto::from(device),
            token,
        }
    }
}

/// Paginated raybot listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RaybotListResponse {
    /// Raybots on this page.
    pub data: Vec<RaybotDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Connected raybots, as seen by the hub.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionListResponse {
    /// Ids of raybots holding a live session.
    pub raybot_ids: Vec<DeviceId>,
    /// Number of live sessions.
    pub count: usize,
}
