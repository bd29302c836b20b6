//! Redis-backed handle store and relay.
//!
//! Descriptors live under `<prefix>:clients:<user_id>` with a TTL that the
//! owning instance keeps refreshing. Frames for a peer are published on
//! `<prefix>:relay:<instance_id>`.

use std::fmt;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{HandleStore, PeerRelay, RELAY_BUFFER};
use crate::domain::{ChannelDescriptor, RelayFrame, UserId};
use crate::error::RealtimeError;

/// Deletes the key only while it still holds the given connection id.
const REMOVE_IF_OWNER: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local ok, decoded = pcall(cjson.decode, raw)
if ok and decoded['connection_id'] == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

/// [`HandleStore`] and [`PeerRelay`] on a shared Redis server.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
    key_prefix: String,
    ttl_secs: u64,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to Redis and prepares a managed connection.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(
        redis_url: &str,
        key_prefix: impl Into<String>,
        ttl_secs: u64,
    ) -> Result<Self, RealtimeError> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            manager,
            key_prefix: key_prefix.into(),
            ttl_secs: ttl_secs.max(1),
        })
    }

    fn handle_key(&self, user_id: &UserId) -> String {
        format!("{}:clients:{}", self.key_prefix, user_id)
    }

    fn relay_topic(&self, instance_id: Uuid) -> String {
        format!("{}:relay:{}", self.key_prefix, instance_id)
    }
}

#[async_trait]
impl HandleStore for RedisStore {
    async fn put(&self, descriptor: &ChannelDescriptor) -> Result<(), RealtimeError> {
        let raw = serde_json::to_string(descriptor)?;
        let mut conn = self.manager.clone();
        let () = redis::cmd("SET")
            .arg(self.handle_key(&descriptor.user_id))
            .arg(raw)
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn fetch(&self, user_id: &UserId) -> Result<Option<String>, RealtimeError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.handle_key(user_id))
            .query_async(&mut conn)
            .await?;
        Ok(raw)
    }

    async fn remove(&self, user_id: &UserId, connection_id: Uuid) -> Result<bool, RealtimeError> {
        let mut conn = self.manager.clone();
        let deleted: i64 = Script::new(REMOVE_IF_OWNER)
            .key(self.handle_key(user_id))
            .arg(connection_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl PeerRelay for RedisStore {
    async fn forward(&self, instance_id: Uuid, frame: &RelayFrame) -> Result<usize, RealtimeError> {
        let payload = serde_json::to_string(frame)?;
        let mut conn = self.manager.clone();
        let receivers: usize = redis::cmd("PUBLISH")
            .arg(self.relay_topic(instance_id))
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }

    async fn listen(&self, instance_id: Uuid) -> Result<mpsc::Receiver<RelayFrame>, RealtimeError> {
        let topic = self.relay_topic(instance_id);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&topic).await?;

        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(error = %e, "unreadable relay payload");
                        continue;
                    }
                };
                match serde_json::from_str::<RelayFrame>(&payload) {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "malformed relay frame"),
                }
            }
            tracing::info!(%topic, "relay subscription ended");
        });

        Ok(rx)
    }
}
