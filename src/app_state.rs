//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::{ConnectionRegistry, EventBus};
use crate::service::Notifier;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Delivery service; also owns the registry handle.
    pub notifier: Arc<Notifier>,
    /// Bus that request handlers publish notifications to.
    pub event_bus: EventBus,
    /// Outbound frames buffered per WebSocket connection.
    pub client_buffer: usize,
}

impl AppState {
    /// Returns the connection registry behind the notifier.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.notifier.registry()
    }
}
