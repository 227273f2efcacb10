//! REST endpoint handlers organized by resource.

pub mod command;
pub mod device;
pub mod hub;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(device::routes())
        .merge(command::routes())
        .merge(hub::routes())
}
