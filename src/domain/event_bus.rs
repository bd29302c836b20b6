//! Broadcast channel for notification events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Request handlers
//! publish a [`NotificationEvent`] after their write commits and return
//! immediately; the dispatcher task drains the bus and performs delivery.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::{Notification, UserId};

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    /// A single user.
    User(UserId),
    /// Every channel in the registry.
    All,
}

/// A notification waiting for delivery.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// Target of the notification.
    pub recipient: Recipient,
    /// What to deliver.
    pub notification: Notification,
    /// When the event was published.
    pub published_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Event addressed to one user.
    #[must_use]
    pub fn to_user(user_id: UserId, notification: Notification) -> Self {
        Self {
            recipient: Recipient::User(user_id),
            notification,
            published_at: Utc::now(),
        }
    }

    /// Event addressed to every connected user.
    #[must_use]
    pub fn to_all(notification: Notification) -> Self {
        Self {
            recipient: Recipient::All,
            notification,
            published_at: Utc::now(),
        }
    }
}

/// Broadcast bus for [`NotificationEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: NotificationEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
