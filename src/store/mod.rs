//! Shared handle store and peer relay.
//!
//! Instances publish a [`ChannelDescriptor`] for every local connection so
//! that a peer which receives a notification for that user can rehydrate a
//! relay channel and forward the frame to the owning instance.
//!
//! Two implementations: [`RedisStore`] for multi-instance deployments and
//! [`MemoryStore`] for single-instance mode and tests.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{ChannelDescriptor, RelayFrame, UserId};
use crate::error::RealtimeError;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Key-value store holding one serialized descriptor per user.
#[async_trait]
pub trait HandleStore: Send + Sync + std::fmt::Debug {
    /// Writes (or refreshes) the descriptor for its user.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the store is unreachable.
    async fn put(&self, descriptor: &ChannelDescriptor) -> Result<(), RealtimeError>;

    /// Fetches the raw serialized descriptor for a user, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the store is unreachable.
    async fn fetch(&self, user_id: &UserId) -> Result<Option<String>, RealtimeError>;

    /// Deletes the user's descriptor if it still names `connection_id`.
    /// Returns whether an entry was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the store is unreachable.
    async fn remove(&self, user_id: &UserId, connection_id: Uuid) -> Result<bool, RealtimeError>;
}

/// Point-to-point frame transport between instances.
#[async_trait]
pub trait PeerRelay: Send + Sync + std::fmt::Debug {
    /// Sends a frame to the instance with the given id. Returns how many
    /// listeners accepted it; zero means the instance is gone.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the relay transport fails.
    async fn forward(&self, instance_id: Uuid, frame: &RelayFrame) -> Result<usize, RealtimeError>;

    /// Starts receiving the frames addressed to `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the subscription cannot be set up.
    async fn listen(&self, instance_id: Uuid) -> Result<mpsc::Receiver<RelayFrame>, RealtimeError>;
}

/// Buffer of frames waiting for the relay listener.
pub(crate) const RELAY_BUFFER: usize = 1024;
