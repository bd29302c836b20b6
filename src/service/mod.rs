//! Service layer: delivery orchestration and background tasks.
//!
//! [`Notifier`] resolves recipients through the registry and writes
//! envelopes; the dispatcher feeds it from the [`super::domain::EventBus`];
//! the relay tasks keep cross-instance delivery alive.

pub mod dispatcher;
pub mod notifier;
pub mod relay;

pub use dispatcher::spawn_dispatcher;
pub use notifier::{BroadcastReport, DeliveryFailure, Notifier};
pub use relay::{spawn_heartbeat, spawn_relay_listener};
