//! Notifier: builds envelopes and pushes them to one or all channels.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ConnectionRegistry, Envelope, Notification, UserId};
use crate::error::RealtimeError;
use crate::persistence::RowCounter;

/// Outcome of a broadcast.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct BroadcastReport {
    /// Channels the message was written to.
    pub delivered: usize,
    /// Recipients whose write failed, with the reason.
    pub failed: Vec<DeliveryFailure>,
}

/// A single failed write during a broadcast.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryFailure {
    /// Recipient.
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Error message.
    pub reason: String,
}

/// Pushes notifications through the [`ConnectionRegistry`].
///
/// Delivery is best-effort and at-most-once: nothing is queued or retried.
/// A channel whose write fails is evicted from the registry.
#[derive(Debug, Clone)]
pub struct Notifier {
    registry: Arc<ConnectionRegistry>,
    counter: Option<Arc<dyn RowCounter>>,
    send_timeout: Duration,
}

impl Notifier {
    /// Creates a notifier. Without a counter, `newblog` fails with
    /// [`RealtimeError::Persistence`].
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        counter: Option<Arc<dyn RowCounter>>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            counter,
            send_timeout,
        }
    }

    /// Returns a reference to the inner [`ConnectionRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Per-write timeout applied to every send.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Turns a notification into its wire envelope. For `newblog` this is
    /// where the live blog total is fetched.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Persistence`] if the blog count cannot be
    /// read and [`RealtimeError::Serialization`] for unencodable payloads.
    pub async fn build_envelope(
        &self,
        notification: Notification,
    ) -> Result<Envelope, RealtimeError> {
        match notification {
            Notification::NewBlog => {
                let counter = self.counter.as_ref().ok_or_else(|| {
                    RealtimeError::Persistence("no row counter configured".to_string())
                })?;
                Ok(Envelope::blog_total(counter.count_blogs().await?))
            }
            other => Envelope::try_from(other),
        }
    }

    /// Sends a notification to a single user.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::NotFound`] if the user has no reachable
    /// channel, [`RealtimeError::TransportWrite`] if the write fails, and
    /// the errors of [`Notifier::build_envelope`].
    pub async fn notify_one(
        &self,
        user_id: &UserId,
        notification: Notification,
    ) -> Result<(), RealtimeError> {
        let channel = self.registry.resolve(user_id).await?;
        let command = notification.command().to_string();
        let text = self.build_envelope(notification).await?.to_text()?;

        if let Err(e) = channel.send_text(user_id, text, self.send_timeout).await {
            self.registry.remove(user_id, channel.connection_id()).await;
            return Err(e);
        }

        tracing::debug!(%user_id, %command, "notification delivered");
        Ok(())
    }

    /// Sends the same notification to every channel in the registry.
    ///
    /// One failed write does not stop the others; failures are collected in
    /// the returned [`BroadcastReport`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the envelope cannot be built, in which case
    /// nothing is sent.
    pub async fn notify_all(
        &self,
        notification: Notification,
    ) -> Result<BroadcastReport, RealtimeError> {
        let command = notification.command().to_string();
        let text = self.build_envelope(notification).await?.to_text()?;
        let mut report = BroadcastReport::default();

        for (user_id, channel) in self.registry.snapshot().await {
            match channel
                .send_text(&user_id, text.clone(), self.send_timeout)
                .await
            {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(%user_id, %command, error = %e, "broadcast write failed");
                    self.registry.remove(&user_id, channel.connection_id()).await;
                    report.failed.push(DeliveryFailure {
                        user_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            %command,
            delivered = report.delivered,
            failed = report.failed.len(),
            "broadcast finished"
        );
        Ok(report)
    }
}
