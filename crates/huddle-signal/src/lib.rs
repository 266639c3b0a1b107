//! # huddle-signal
//!
//! Real-time signaling for project video rooms.
//!
//! Browsers connect over a WebSocket, join the room for a project, and use
//! the server to find each other and exchange WebRTC offers, answers and ICE
//! candidates. Media never passes through here: peers connect directly in a
//! full mesh once negotiation is done. The same channel carries screen-share
//! notices and in-room text chat.
//!
//! - [`registry`]: rooms, their participants, and the reverse index
//! - [`presence`]: join/leave notifications
//! - [`relay`]: point-to-point forwarding of negotiation payloads
//! - [`chat`]: room-wide chat broadcast
//! - [`hub`]: the shared entry point every connection calls into
//! - [`handler`]: the axum WebSocket endpoint

pub mod chat;
pub mod connection;
pub mod error;
pub mod handler;
pub mod hub;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod relay;

pub use connection::{ConnectionId, ConnectionState};
pub use error::SignalError;
pub use handler::build_router;
pub use hub::{SignalHub, SignalSettings};
pub use registry::{RegistryStats, RoomId};
