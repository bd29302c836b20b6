//! Notification publishing DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::PaginationMeta;
use crate::domain::Notification;
use crate::error::RealtimeError;

/// Request body for the notification endpoints: the untyped envelope.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NotifyRequest {
    /// Command tag (e.g. `"newComment"`).
    pub command: String,
    /// Command-specific payload.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl NotifyRequest {
    /// Converts the request into a typed [`Notification`].
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Notification::from_command`].
    pub fn into_notification(self) -> Result<Notification, RealtimeError> {
        Notification::from_command(&self.command, self.data)
    }
}

/// Response for notifications accepted onto the event bus.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotifyAcceptedResponse {
    /// Command tag that was queued.
    pub command: String,
    /// Recipient user id, or `"*"` for a broadcast.
    pub recipient: String,
    /// Number of bus consumers that picked the event up.
    pub receivers: usize,
    /// When the event was published.
    pub published_at: DateTime<Utc>,
}

/// Response for a synchronous single-user delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveredResponse {
    /// Command tag that was delivered.
    pub command: String,
    /// Recipient user id.
    pub recipient: String,
    /// Delivery timestamp.
    pub delivered_at: DateTime<Utc>,
}

/// Response body for `GET /connections`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionListResponse {
    /// This instance's id in the shared store.
    pub instance_id: Uuid,
    /// User ids with an entry, sorted.
    pub data: Vec<String>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
