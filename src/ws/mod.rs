//! WebSocket layer: upgrade handling and the per-connection loop.
//!
//! The endpoint at `/ws` is the realtime transport: each connection becomes
//! the user's live channel in the registry and receives notifications as
//! JSON text frames.

pub mod connection;
pub mod handler;
pub mod messages;
