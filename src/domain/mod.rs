//! Domain layer: identities, command and device models, bus events.
//!
//! This module contains the server-side domain model: device and command
//! identity, the command state machine, the device status record, and the
//! in-process event bus that decouples command creation from delivery.

pub mod command;
pub mod command_event;
pub mod command_id;
pub mod device;
pub mod device_id;
pub mod event_bus;

pub use command::{Command, CommandStatus, CommandType};
pub use command_event::{COMMAND_CREATED_TOPIC, CommandCreated};
pub use command_id::CommandId;
pub use device::{Device, DeviceStatus, DeviceTransition};
pub use device_id::DeviceId;
pub use event_bus::{BusMessage, EventBus, EventPublisher, Subscription};
