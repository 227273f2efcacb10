//! Data Transfer Objects for REST request/response serialization.
//!
//! Identifiers are serialized as UUID strings and timestamps as RFC 3339.

pub mod command_dto;
pub mod common_dto;
pub mod device_dto;

pub use command_dto::*;
pub use common_dto::*;
pub use device_dto::*;
