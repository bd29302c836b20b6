//! In-process handle store and relay.
//!
//! Used when no `REDIS_URL` is configured. Several registries sharing one
//! [`MemoryStore`] behave like instances sharing a Redis server, which is
//! how the cross-instance paths are tested.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use super::{HandleStore, PeerRelay, RELAY_BUFFER};
use crate::domain::{ChannelDescriptor, RelayFrame, UserId};
use crate::error::RealtimeError;

#[derive(Debug)]
struct StoredHandle {
    raw: String,
    connection_id: Option<Uuid>,
    expires_at: Instant,
}

/// In-memory [`HandleStore`] and [`PeerRelay`] with per-entry TTL.
#[derive(Debug)]
pub struct MemoryStore {
    ttl: Duration,
    handles: RwLock<HashMap<UserId, StoredHandle>>,
    listeners: RwLock<HashMap<Uuid, mpsc::Sender<RelayFrame>>>,
}

impl MemoryStore {
    /// Creates an empty store whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            handles: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds a raw entry, bypassing descriptor serialization. Lets callers
    /// simulate entries written by other software versions.
    pub async fn insert_raw(&self, user_id: UserId, raw: impl Into<String>) {
        let handle = StoredHandle {
            raw: raw.into(),
            connection_id: None,
            expires_at: Instant::now() + self.ttl,
        };
        self.handles.write().await.insert(user_id, handle);
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.handles
            .read()
            .await
            .values()
            .filter(|h| h.expires_at > now)
            .count()
    }

    /// Returns `true` if no live entry exists.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(90))
    }
}

#[async_trait]
impl HandleStore for MemoryStore {
    async fn put(&self, descriptor: &ChannelDescriptor) -> Result<(), RealtimeError> {
        let handle = StoredHandle {
            raw: serde_json::to_string(descriptor)?,
            connection_id: Some(descriptor.connection_id),
            expires_at: Instant::now() + self.ttl,
        };
        self.handles
            .write()
            .await
            .insert(descriptor.user_id.clone(), handle);
        Ok(())
    }

    async fn fetch(&self, user_id: &UserId) -> Result<Option<String>, RealtimeError> {
        let map = self.handles.read().await;
        Ok(map
            .get(user_id)
            .filter(|h| h.expires_at > Instant::now())
            .map(|h| h.raw.clone()))
    }

    async fn remove(&self, user_id: &UserId, connection_id: Uuid) -> Result<bool, RealtimeError> {
        let mut map = self.handles.write().await;
        if map
            .get(user_id)
            .is_some_and(|h| h.connection_id == Some(connection_id))
        {
            map.remove(user_id);
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl PeerRelay for MemoryStore {
    async fn forward(&self, instance_id: Uuid, frame: &RelayFrame) -> Result<usize, RealtimeError> {
        let listeners = self.listeners.read().await;
        let Some(tx) = listeners.get(&instance_id) else {
            return Ok(0);
        };
        match tx.try_send(frame.clone()) {
            Ok(()) => Ok(1),
            Err(mpsc::error::TrySendError::Closed(_)) => Ok(0),
            Err(mpsc::error::TrySendError::Full(_)) => Err(RealtimeError::Store(format!(
                "relay buffer for instance {instance_id} is full"
            ))),
        }
    }

    async fn listen(&self, instance_id: Uuid) -> Result<mpsc::Receiver<RelayFrame>, RealtimeError> {
        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        self.listeners.write().await.insert(instance_id, tx);
        Ok(rx)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn user(raw: &str) -> UserId {
        let Ok(id) = UserId::parse(raw) else {
            panic!("valid user id");
        };
        id
    }

    fn descriptor(user_id: &str) -> ChannelDescriptor {
        ChannelDescriptor {
            user_id: user(user_id),
            connection_id: Uuid::new_v4(),
            instance_id: Uuid::new_v4(),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_fetch_returns_descriptor() {
        let store = MemoryStore::default();
        let d = descriptor("u1");
        tokio_test::assert_ok!(store.put(&d).await);

        let Ok(Some(raw)) = store.fetch(&user("u1")).await else {
            panic!("expected stored entry");
        };
        let Ok(parsed) = serde_json::from_str::<ChannelDescriptor>(&raw) else {
            panic!("stored entry is a descriptor");
        };
        assert_eq!(parsed, d);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let store = MemoryStore::new(Duration::from_millis(10));
        tokio_test::assert_ok!(store.put(&descriptor("u1")).await);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.fetch(&user("u1")).await.ok(), Some(None));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn remove_ignores_other_connections() {
        let store = MemoryStore::default();
        let d = descriptor("u1");
        tokio_test::assert_ok!(store.put(&d).await);

        assert_eq!(store.remove(&user("u1"), Uuid::new_v4()).await.ok(), Some(false));
        assert_eq!(store.remove(&user("u1"), d.connection_id).await.ok(), Some(true));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn forward_without_listener_reaches_nobody() {
        let store = MemoryStore::default();
        let frame = RelayFrame {
            user_id: user("u1"),
            connection_id: Uuid::new_v4(),
            payload: "{}".to_string(),
        };
        assert_eq!(store.forward(Uuid::new_v4(), &frame).await.ok(), Some(0));
    }

    #[tokio::test]
    async fn forward_reaches_listener() {
        let store = MemoryStore::default();
        let instance = Uuid::new_v4();
        let Ok(mut rx) = store.listen(instance).await else {
            panic!("listen failed");
        };
        let frame = RelayFrame {
            user_id: user("u1"),
            connection_id: Uuid::new_v4(),
            payload: "{}".to_string(),
        };
        assert_eq!(store.forward(instance, &frame).await.ok(), Some(1));
        assert_eq!(rx.recv().await, Some(frame));
    }
}
