//! Service layer: business logic orchestration.
//!
//! [`CommandService`] is the only writer of command state and the bridge
//! from command creation to the event bus. [`DeviceService`] owns device
//! registration and the status bookkeeping sessions rely on.

pub mod command_service;
pub mod device_service;

pub use command_service::CommandService;
pub use device_service::DeviceService;
