//! # raybot-gateway
//!
//! Realtime session hub and command dispatch for raybots.
//!
//! Raybots hold one persistent WebSocket each. Commands created over REST
//! are persisted, announced on an in-process event bus, and forwarded by
//! the hub to the addressed raybot's live session. Replies flow back over
//! the same socket and advance the command's status.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)                  Raybots (WebSocket)
//!     │                                │
//!     ├── REST Handlers (api/)         ├── Upgrade Handler (ws/handler)
//!     │                                │
//!     ├── CommandService ──────┐       ├── DeviceSession (read/write pumps)
//!     ├── DeviceService        │       │
//!     │                   EventBus ──▶ bridge ──▶ Hub (registry owner)
//!     │
//!     └── CommandStore / DeviceStore (memory or PostgreSQL)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
