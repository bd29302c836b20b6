//! Client channels: the registry's handle to a connected user.
//!
//! A [`ClientChannel`] is either a local WebSocket connection owned by this
//! process, or a relay to the peer instance that owns the socket. Both
//! accept serialized text frames and enforce a per-write timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use uuid::Uuid;

use super::UserId;
use crate::error::RealtimeError;
use crate::store::PeerRelay;

/// Serializable description of a live connection, published to the shared
/// store so that peer instances can reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Connected user.
    pub user_id: UserId,
    /// Connection owning the socket.
    pub connection_id: Uuid,
    /// Process instance that owns the connection.
    pub instance_id: Uuid,
    /// When the connection was registered.
    pub registered_at: DateTime<Utc>,
}

/// A text frame forwarded to the instance owning the recipient's socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFrame {
    /// Recipient.
    pub user_id: UserId,
    /// Connection the frame is addressed to.
    pub connection_id: Uuid,
    /// Serialized envelope.
    pub payload: String,
}

/// Sender half of a WebSocket connection owned by this process.
#[derive(Debug, Clone)]
pub struct LocalChannel {
    connection_id: Uuid,
    registered_at: DateTime<Utc>,
    tx: mpsc::Sender<String>,
}

/// Channel rehydrated from a peer's descriptor.
#[derive(Debug, Clone)]
pub struct RelayChannel {
    descriptor: ChannelDescriptor,
    relay: Arc<dyn PeerRelay>,
    cached_at: Instant,
}

/// Handle the registry stores per user.
#[derive(Debug, Clone)]
pub enum ClientChannel {
    /// Socket owned by this process.
    Local(LocalChannel),
    /// Socket owned by a peer instance.
    Relay(RelayChannel),
}

impl ClientChannel {
    /// Creates a local channel with a bounded outbound buffer, returning the
    /// receiver the connection task drains into its socket.
    #[must_use]
    pub fn local(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let channel = LocalChannel {
            connection_id: Uuid::new_v4(),
            registered_at: Utc::now(),
            tx,
        };
        (Self::Local(channel), rx)
    }

    /// Creates a relay channel from a peer's descriptor.
    #[must_use]
    pub fn relay(descriptor: ChannelDescriptor, relay: Arc<dyn PeerRelay>) -> Self {
        Self::Relay(RelayChannel {
            descriptor,
            relay,
            cached_at: Instant::now(),
        })
    }

    /// Connection this channel delivers to.
    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        match self {
            Self::Local(c) => c.connection_id,
            Self::Relay(c) => c.descriptor.connection_id,
        }
    }

    /// Returns `true` for channels owned by this process.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns `true` once the receiving end of a local channel is gone.
    /// Relay channels only find out on the next send.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Local(c) => c.tx.is_closed(),
            Self::Relay(_) => false,
        }
    }

    /// Returns `true` for relay channels rehydrated at least `ttl` ago.
    /// Local channels never expire.
    #[must_use]
    pub fn relay_expired(&self, ttl: Duration) -> bool {
        match self {
            Self::Local(_) => false,
            Self::Relay(c) => c.cached_at.elapsed() >= ttl,
        }
    }

    /// Descriptor to publish for this channel, or `None` for relays.
    #[must_use]
    pub fn descriptor(&self, user_id: &UserId, instance_id: Uuid) -> Option<ChannelDescriptor> {
        match self {
            Self::Local(c) => Some(ChannelDescriptor {
                user_id: user_id.clone(),
                connection_id: c.connection_id,
                instance_id,
                registered_at: c.registered_at,
            }),
            Self::Relay(_) => None,
        }
    }

    /// Writes one text frame, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::TransportWrite`] if the connection is gone,
    /// its buffer stays full past the timeout, or no peer instance accepted
    /// a relayed frame.
    pub async fn send_text(
        &self,
        user_id: &UserId,
        text: String,
        timeout: Duration,
    ) -> Result<(), RealtimeError> {
        let write_error = |reason: String| RealtimeError::TransportWrite {
            user_id: user_id.clone(),
            reason,
        };

        match self {
            Self::Local(c) => c.tx.send_timeout(text, timeout).await.map_err(|e| match e {
                SendTimeoutError::Timeout(_) => {
                    write_error(format!("timed out after {} ms", timeout.as_millis()))
                }
                SendTimeoutError::Closed(_) => write_error("connection closed".to_string()),
            }),
            Self::Relay(c) => {
                let frame = RelayFrame {
                    user_id: user_id.clone(),
                    connection_id: c.descriptor.connection_id,
                    payload: text,
                };
                let forwarded =
                    tokio::time::timeout(timeout, c.relay.forward(c.descriptor.instance_id, &frame))
                        .await
                        .map_err(|_| {
                            write_error(format!("relay timed out after {} ms", timeout.as_millis()))
                        })?;
                match forwarded {
                    Ok(0) => Err(write_error(format!(
                        "peer instance {} is unreachable",
                        c.descriptor.instance_id
                    ))),
                    Ok(_) => Ok(()),
                    Err(e) => Err(write_error(e.to_string())),
                }
            }
        }
    }
}
