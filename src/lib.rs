//! # hyperpage-realtime
//!
//! Realtime notification fan-out for the hyperpage backend.
//!
//! Browser clients hold a WebSocket per user; the CRUD services publish
//! notifications after their writes commit; this crate delivers them as
//! `{command, data?}` JSON frames, best-effort and at most once.
//!
//! ## Architecture
//!
//! ```text
//! CRUD services (HTTP)          Clients (WebSocket)
//!     │                              │
//!     ├── REST Handlers (api/)       ├── WS Handler (ws/)
//!     │                              │
//!     ├── EventBus (domain/)         │
//!     ├── Dispatcher (service/)      │
//!     ├── Notifier (service/) ──► ConnectionRegistry (domain/)
//!     │                              │
//!     ├── RowCounter (persistence/)  ├── HandleStore / PeerRelay (store/)
//!     └── PostgreSQL                 └── Redis
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod store;
pub mod ws;
