//! # docrelay - Collaborative editing relay
//!
//! A room-based relay for real-time collaborative editors. Clients join named
//! rooms and exchange opaque document and awareness updates; the relay caches the
//! latest payload of each kind per room so late joiners can catch up, and fans
//! every update out to the other members of the sender's room.
//!
//! The relay never decodes or merges payloads. It is a last-writer-wins cache plus
//! fan-out, meant to sit in front of a client-side merge engine.

pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;

#[cfg(feature = "axum")]
pub mod axum;

// Re-exports for convenience
pub use config::Config;
pub use error::{RelayError, RelayResult};
pub use protocol::{Blob, ClientMessage, ServerMessage, UpdateKind};
pub use relay::{ConnectionId, JoinParams, Relay, SessionInfo, DEFAULT_ROOM};

#[cfg(feature = "axum")]
pub use crate::axum::{
    router_with_relay, router_with_relay_state, run_server, RelayState, WebSocketHandler,
};
