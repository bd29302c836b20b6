//! Domain layer: identities, notifications, channels, registry and events.
//!
//! This module contains the server-side model of the fan-out service: who
//! can be notified ([`UserId`]), what can be sent ([`Notification`],
//! [`Envelope`]), where it goes ([`ClientChannel`], [`ConnectionRegistry`]),
//! and the bus that decouples publishers from delivery ([`EventBus`]).

pub mod channel;
pub mod event_bus;
pub mod notification;
pub mod registry;
pub mod user_id;

pub use channel::{ChannelDescriptor, ClientChannel, RelayFrame};
pub use event_bus::{EventBus, NotificationEvent, Recipient};
pub use notification::{Envelope, Notification};
pub use registry::ConnectionRegistry;
pub use user_id::UserId;
