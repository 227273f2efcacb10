//! WebSocket layer: device sessions, the connection hub, and the bridge
//! from command creation to delivery.
//!
//! ```text
//! CommandService ──command.created──▶ EventBus ──▶ bridge ──Deliver──▶ Hub
//!                                                                     │
//!                          raybot ◀── write pump ◀── outbound queue ◀─┘
//!                          raybot ──▶ read pump ──▶ inbound::dispatch
//! ```
//!
//! Devices connect at `GET /ws/raybots?id=<uuid>`.

pub mod bridge;
pub mod handler;
pub mod hub;
pub mod inbound;
pub mod messages;
pub mod session;

pub use hub::{Hub, HubHandle};
pub use session::{DeviceSession, SessionContext};
