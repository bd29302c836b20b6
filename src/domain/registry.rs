//! Concurrent user → channel registry with store-backed rehydration.
//!
//! [`ConnectionRegistry`] keeps at most one channel per user in a
//! `RwLock<HashMap<..>>`. Local connections are mirrored into the shared
//! [`HandleStore`]; a local miss falls back to that store and caches a
//! relay channel to the owning peer until the relay TTL runs out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChannelDescriptor, ClientChannel, RelayFrame, UserId};
use crate::error::RealtimeError;
use crate::store::{HandleStore, PeerRelay};

/// Default lifetime of a cached relay channel before it is re-validated
/// against the shared store.
pub const DEFAULT_RELAY_TTL: Duration = Duration::from_secs(90);

/// Upper bound on put/re-check rounds when publishing a descriptor.
const MAX_PUBLISH_ROUNDS: usize = 4;

/// Central store for the channels reachable from this instance.
///
/// # Concurrency
///
/// - Lookups take the read lock; register and remove take the write lock.
/// - Sends never run under the lock: callers get cloned channels.
/// - Relay entries are re-validated against the store once they are older
///   than the relay TTL.
#[derive(Debug)]
pub struct ConnectionRegistry {
    instance_id: Uuid,
    relay_ttl: Duration,
    channels: RwLock<HashMap<UserId, ClientChannel>>,
    store: Arc<dyn HandleStore>,
    relay: Arc<dyn PeerRelay>,
}

impl ConnectionRegistry {
    /// Creates an empty registry for a fresh instance id.
    #[must_use]
    pub fn new(store: Arc<dyn HandleStore>, relay: Arc<dyn PeerRelay>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            relay_ttl: DEFAULT_RELAY_TTL,
            channels: RwLock::new(HashMap::new()),
            store,
            relay,
        }
    }

    /// Sets how long a relay channel is trusted before its descriptor is
    /// fetched again.
    #[must_use]
    pub const fn with_relay_ttl(mut self, relay_ttl: Duration) -> Self {
        self.relay_ttl = relay_ttl;
        self
    }

    /// Identifier of this process instance in the shared store.
    #[must_use]
    pub const fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Installs `channel` as the live channel for `user_id`, returning the
    /// one it replaced.
    ///
    /// Local channels are also published to the shared store. A store
    /// failure is logged and otherwise ignored: the user stays reachable
    /// through this instance.
    pub async fn register(&self, user_id: UserId, channel: ClientChannel) -> Option<ClientChannel> {
        let descriptor = channel.descriptor(&user_id, self.instance_id);
        let connection_id = channel.connection_id();
        let previous = self.channels.write().await.insert(user_id.clone(), channel);

        if let Some(descriptor) = descriptor {
            self.publish_descriptor(&user_id, descriptor).await;
        }

        tracing::debug!(%user_id, %connection_id, replaced = previous.is_some(), "channel registered");
        previous
    }

    /// Writes `descriptor`, then re-checks the registry. If the entry changed
    /// while the write was in flight, the current entry's descriptor is
    /// written instead, or ours is withdrawn when no local entry is left.
    /// Returns whether the store ends up naming the current local channel.
    async fn publish_descriptor(&self, user_id: &UserId, mut descriptor: ChannelDescriptor) -> bool {
        for _ in 0..MAX_PUBLISH_ROUNDS {
            if let Err(e) = self.store.put(&descriptor).await {
                tracing::warn!(%user_id, error = %e, "failed to publish channel descriptor");
                return false;
            }

            let current = self
                .channels
                .read()
                .await
                .get(user_id)
                .and_then(|c| c.descriptor(user_id, self.instance_id));

            match current {
                Some(d) if d.connection_id == descriptor.connection_id => return true,
                Some(d) => descriptor = d,
                None => {
                    if let Err(e) = self.store.remove(user_id, descriptor.connection_id).await {
                        tracing::warn!(%user_id, error = %e, "failed to withdraw channel descriptor");
                    }
                    return false;
                }
            }
        }
        tracing::warn!(%user_id, "channel kept changing while publishing its descriptor");
        false
    }

    /// Returns the channel for `user_id`, rehydrating it from the shared
    /// store on a local miss or when a cached relay entry has expired.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::NotFound`] if neither the registry nor the
    /// store yields a usable channel. Store failures and malformed or stale
    /// descriptors are reported as not-found; nothing is retried.
    pub async fn resolve(&self, user_id: &UserId) -> Result<ClientChannel, RealtimeError> {
        let expired = match self.channels.read().await.get(user_id) {
            Some(channel) if !channel.relay_expired(self.relay_ttl) => {
                return Ok(channel.clone());
            }
            Some(channel) => Some(channel.connection_id()),
            None => None,
        };

        let descriptor = match self.fetch_descriptor(user_id).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                if let Some(connection_id) = expired {
                    self.remove(user_id, connection_id).await;
                }
                return Err(e);
            }
        };

        let channel = ClientChannel::relay(descriptor, Arc::clone(&self.relay));
        let mut map = self.channels.write().await;
        // A local registration or a fresher rehydration may have won the race.
        let kept = map
            .get(user_id)
            .filter(|c| !c.relay_expired(self.relay_ttl))
            .cloned();
        let cached = match kept {
            Some(existing) => existing,
            None => {
                map.insert(user_id.clone(), channel.clone());
                channel
            }
        };
        tracing::debug!(%user_id, connection_id = %cached.connection_id(), "channel rehydrated from store");
        Ok(cached)
    }

    /// Reads and checks the user's descriptor from the shared store.
    async fn fetch_descriptor(&self, user_id: &UserId) -> Result<ChannelDescriptor, RealtimeError> {
        let not_found = || RealtimeError::NotFound(user_id.clone());

        let raw = match self.store.fetch(user_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(not_found()),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "handle store lookup failed");
                return Err(not_found());
            }
        };

        let descriptor = match serde_json::from_str::<ChannelDescriptor>(&raw) {
            Ok(d) if d.user_id == *user_id => d,
            Ok(d) => {
                tracing::warn!(%user_id, stored = %d.user_id, "descriptor names another user");
                return Err(not_found());
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "malformed channel descriptor");
                return Err(not_found());
            }
        };

        // Our own descriptor outliving the local entry means the socket is gone.
        if descriptor.instance_id == self.instance_id {
            tracing::debug!(%user_id, "ignoring stale descriptor of this instance");
            return Err(not_found());
        }
        Ok(descriptor)
    }

    /// Removes the entry for `user_id` if it still belongs to
    /// `connection_id`. Returns whether an entry was removed.
    ///
    /// A reconnect replaces the entry before the old socket finishes
    /// tearing down; the connection id check keeps the new entry alive.
    pub async fn remove(&self, user_id: &UserId, connection_id: Uuid) -> bool {
        let removed = {
            let mut map = self.channels.write().await;
            match map.get(user_id) {
                Some(channel) if channel.connection_id() == connection_id => map.remove(user_id),
                _ => None,
            }
        };

        let Some(channel) = removed else {
            return false;
        };

        if channel.is_local()
            && let Err(e) = self.store.remove(user_id, connection_id).await
        {
            tracing::warn!(%user_id, error = %e, "failed to delete channel descriptor");
        }

        tracing::debug!(%user_id, %connection_id, "channel removed");
        true
    }

    /// Connection currently registered for `user_id`, if any.
    pub async fn connection_of(&self, user_id: &UserId) -> Option<Uuid> {
        self.channels
            .read()
            .await
            .get(user_id)
            .map(ClientChannel::connection_id)
    }

    /// Clones every entry so callers can send without holding the lock.
    pub async fn snapshot(&self) -> Vec<(UserId, ClientChannel)> {
        self.channels
            .read()
            .await
            .iter()
            .map(|(user_id, channel)| (user_id.clone(), channel.clone()))
            .collect()
    }

    /// Sorted ids of all users with an entry.
    pub async fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.channels.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of entries in the registry.
    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Returns `true` if the registry holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }

    /// Re-publishes the descriptors of all open local channels, extending
    /// their TTL in the shared store. Returns how many were refreshed.
    pub async fn refresh_descriptors(&self) -> usize {
        let descriptors: Vec<(UserId, ChannelDescriptor)> = self
            .channels
            .read()
            .await
            .iter()
            .filter(|(_, channel)| !channel.is_closed())
            .filter_map(|(user_id, channel)| {
                channel
                    .descriptor(user_id, self.instance_id)
                    .map(|d| (user_id.clone(), d))
            })
            .collect();

        let mut refreshed = 0;
        for (user_id, descriptor) in descriptors {
            if self.publish_descriptor(&user_id, descriptor).await {
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Starts receiving frames that peers relay to this instance.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Store`] if the relay subscription fails.
    pub async fn listen_for_relays(
        &self,
    ) -> Result<tokio::sync::mpsc::Receiver<RelayFrame>, RealtimeError> {
        self.relay.listen(self.instance_id).await
    }

    /// Writes a frame relayed by a peer to the user's local connection.
    ///
    /// The frame follows the user: if they reconnected to this instance
    /// since the peer rehydrated its entry, the new connection gets it.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::NotFound`] if the user has no local
    /// connection, or [`RealtimeError::TransportWrite`] if the write fails.
    pub async fn deliver_local(
        &self,
        frame: RelayFrame,
        timeout: Duration,
    ) -> Result<(), RealtimeError> {
        let channel = self
            .channels
            .read()
            .await
            .get(&frame.user_id)
            .filter(|c| c.is_local())
            .cloned()
            .ok_or_else(|| RealtimeError::NotFound(frame.user_id.clone()))?;

        let connection_id = channel.connection_id();
        if connection_id != frame.connection_id {
            tracing::debug!(
                user_id = %frame.user_id,
                addressed = %frame.connection_id,
                current = %connection_id,
                "relayed frame redirected to newer connection"
            );
        }

        let result = channel
            .send_text(&frame.user_id, frame.payload, timeout)
            .await;
        if result.is_err() {
            self.remove(&frame.user_id, connection_id).await;
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::store::MemoryStore;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn user(raw: &str) -> UserId {
        let Ok(id) = UserId::parse(raw) else {
            panic!("valid user id");
        };
        id
    }

    /// Store that counts lookups and can be told to fail.
    #[derive(Debug, Default)]
    struct CountingStore {
        inner: MemoryStore,
        fetches: AtomicUsize,
        failing: bool,
    }

    #[async_trait]
    impl HandleStore for CountingStore {
        async fn put(&self, descriptor: &ChannelDescriptor) -> Result<(), RealtimeError> {
            self.inner.put(descriptor).await
        }

        async fn fetch(&self, user_id: &UserId) -> Result<Option<String>, RealtimeError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                return Err(RealtimeError::Store("connection refused".to_string()));
            }
            self.inner.fetch(user_id).await
        }

        async fn remove(&self, user_id: &UserId, connection_id: Uuid) -> Result<bool, RealtimeError> {
            self.inner.remove(user_id, connection_id).await
        }
    }

    fn registry_with(store: Arc<CountingStore>) -> ConnectionRegistry {
        let relay: Arc<dyn PeerRelay> = Arc::new(MemoryStore::default());
        ConnectionRegistry::new(store, relay)
    }

    fn shared_pair() -> (ConnectionRegistry, ConnectionRegistry) {
        let shared = Arc::new(MemoryStore::default());
        let a = ConnectionRegistry::new(
            Arc::clone(&shared) as Arc<dyn HandleStore>,
            Arc::clone(&shared) as Arc<dyn PeerRelay>,
        );
        let b = ConnectionRegistry::new(
            Arc::clone(&shared) as Arc<dyn HandleStore>,
            shared as Arc<dyn PeerRelay>,
        );
        (a, b)
    }

    #[tokio::test]
    async fn registered_channel_resolves_without_store() {
        let store = Arc::new(CountingStore::default());
        let registry = registry_with(Arc::clone(&store));
        let (channel, _rx) = ClientChannel::local(4);
        let connection_id = channel.connection_id();

        registry.register(user("u1"), channel).await;

        let Ok(resolved) = registry.resolve(&user("u1")).await else {
            panic!("expected registered channel");
        };
        assert_eq!(resolved.connection_id(), connection_id);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn register_twice_keeps_most_recent() {
        let registry = registry_with(Arc::new(CountingStore::default()));
        let (first, _rx1) = ClientChannel::local(4);
        let (second, _rx2) = ClientChannel::local(4);
        let second_id = second.connection_id();

        assert!(registry.register(user("u1"), first).await.is_none());
        assert!(registry.register(user("u1"), second).await.is_some());

        assert_eq!(registry.len().await, 1);
        let Ok(resolved) = registry.resolve(&user("u1")).await else {
            panic!("expected channel");
        };
        assert_eq!(resolved.connection_id(), second_id);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let registry = registry_with(Arc::new(CountingStore::default()));
        let result = registry.resolve(&user("ghost")).await;
        assert!(matches!(result, Err(RealtimeError::NotFound(_))));
    }

    #[tokio::test]
    async fn store_error_is_not_found() {
        let store = Arc::new(CountingStore {
            failing: true,
            ..CountingStore::default()
        });
        let registry = registry_with(Arc::clone(&store));
        let result = registry.resolve(&user("ghost")).await;
        assert!(matches!(result, Err(RealtimeError::NotFound(_))));
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_descriptor_is_not_found() {
        let store = Arc::new(CountingStore::default());
        store.inner.insert_raw(user("u9"), "not-a-descriptor").await;
        let registry = registry_with(store);

        let result = registry.resolve(&user("u9")).await;
        assert!(matches!(result, Err(RealtimeError::NotFound(_))));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn store_entry_resolves_once_then_caches() {
        let store = Arc::new(CountingStore::default());
        let descriptor = ChannelDescriptor {
            user_id: user("u2"),
            connection_id: Uuid::new_v4(),
            instance_id: Uuid::new_v4(),
            registered_at: Utc::now(),
        };
        tokio_test::assert_ok!(store.put(&descriptor).await);
        let registry = registry_with(Arc::clone(&store));

        let Ok(first) = registry.resolve(&user("u2")).await else {
            panic!("expected rehydrated channel");
        };
        let Ok(second) = registry.resolve(&user("u2")).await else {
            panic!("expected cached channel");
        };

        assert!(!first.is_local());
        assert_eq!(first.connection_id(), descriptor.connection_id);
        assert_eq!(second.connection_id(), descriptor.connection_id);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn own_stale_descriptor_is_not_found() {
        let store = Arc::new(CountingStore::default());
        let registry = registry_with(Arc::clone(&store));
        let descriptor = ChannelDescriptor {
            user_id: user("u3"),
            connection_id: Uuid::new_v4(),
            instance_id: registry.instance_id(),
            registered_at: Utc::now(),
        };
        tokio_test::assert_ok!(store.put(&descriptor).await);

        let result = registry.resolve(&user("u3")).await;
        assert!(matches!(result, Err(RealtimeError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_checks_connection_id() {
        let store = Arc::new(CountingStore::default());
        let registry = registry_with(Arc::clone(&store));
        let (old, _rx1) = ClientChannel::local(4);
        let old_id = old.connection_id();
        let (new, _rx2) = ClientChannel::local(4);
        let new_id = new.connection_id();

        registry.register(user("u1"), old).await;
        registry.register(user("u1"), new).await;

        assert!(!registry.remove(&user("u1"), old_id).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.remove(&user("u1"), new_id).await);
        assert!(registry.is_empty().await);
        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn refresh_republishes_local_descriptors() {
        let store = Arc::new(CountingStore::default());
        let registry = registry_with(Arc::clone(&store));
        let (a, _rx1) = ClientChannel::local(4);
        let (b, _rx2) = ClientChannel::local(4);
        registry.register(user("u1"), a).await;
        registry.register(user("u2"), b).await;

        assert_eq!(registry.refresh_descriptors().await, 2);
        assert_eq!(store.inner.len().await, 2);
    }

    #[tokio::test]
    async fn frame_relayed_between_instances_reaches_socket() {
        let (owner, peer) = shared_pair();
        let Ok(mut frames) = owner.listen_for_relays().await else {
            panic!("listen failed");
        };
        let (channel, mut socket_rx) = ClientChannel::local(4);
        owner.register(user("u1"), channel).await;

        let Ok(remote) = peer.resolve(&user("u1")).await else {
            panic!("peer should rehydrate from shared store");
        };
        tokio_test::assert_ok!(
            remote
                .send_text(&user("u1"), "hi".to_string(), TIMEOUT)
                .await
        );

        let Some(frame) = frames.recv().await else {
            panic!("expected relayed frame");
        };
        tokio_test::assert_ok!(owner.deliver_local(frame, TIMEOUT).await);
        assert_eq!(socket_rx.recv().await.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn relay_to_departed_peer_fails() {
        let (owner, peer) = shared_pair();
        let (channel, _rx) = ClientChannel::local(4);
        owner.register(user("u1"), channel).await;

        // Owner never listens, as if it had died.
        let Ok(remote) = peer.resolve(&user("u1")).await else {
            panic!("peer should rehydrate from shared store");
        };
        let sent = remote.send_text(&user("u1"), "hi".to_string(), TIMEOUT).await;
        assert!(matches!(sent, Err(RealtimeError::TransportWrite { .. })));
    }

    #[tokio::test]
    async fn deliver_local_without_local_channel_is_not_found() {
        let registry = registry_with(Arc::new(CountingStore::default()));

        let frame = RelayFrame {
            user_id: user("u1"),
            connection_id: Uuid::new_v4(),
            payload: "{}".to_string(),
        };
        let result = registry.deliver_local(frame, TIMEOUT).await;
        assert!(matches!(result, Err(RealtimeError::NotFound(_))));
    }

    #[tokio::test]
    async fn relayed_frames_follow_reconnect_on_owner() {
        let (owner, peer) = shared_pair();
        let Ok(mut frames) = owner.listen_for_relays().await else {
            panic!("listen failed");
        };
        let (first, _old_rx) = ClientChannel::local(4);
        let first_id = first.connection_id();
        owner.register(user("u1"), first).await;

        let Ok(remote) = peer.resolve(&user("u1")).await else {
            panic!("peer should rehydrate from shared store");
        };

        // User reloads: old socket torn down, new one registered on the owner.
        owner.remove(&user("u1"), first_id).await;
        let (second, mut new_rx) = ClientChannel::local(4);
        owner.register(user("u1"), second).await;

        tokio_test::assert_ok!(
            remote
                .send_text(&user("u1"), "after-reload".to_string(), TIMEOUT)
                .await
        );
        let Some(frame) = frames.recv().await else {
            panic!("expected relayed frame");
        };
        tokio_test::assert_ok!(owner.deliver_local(frame, TIMEOUT).await);
        assert_eq!(new_rx.recv().await.as_deref(), Some("after-reload"));
    }

    #[tokio::test]
    async fn expired_relay_is_dropped_once_user_disconnects() {
        let shared = Arc::new(MemoryStore::default());
        let owner = ConnectionRegistry::new(
            Arc::clone(&shared) as Arc<dyn HandleStore>,
            Arc::clone(&shared) as Arc<dyn PeerRelay>,
        );
        let peer = ConnectionRegistry::new(
            Arc::clone(&shared) as Arc<dyn HandleStore>,
            shared as Arc<dyn PeerRelay>,
        )
        .with_relay_ttl(Duration::from_millis(20));

        let (channel, _rx) = ClientChannel::local(4);
        let connection_id = channel.connection_id();
        owner.register(user("u1"), channel).await;
        tokio_test::assert_ok!(peer.resolve(&user("u1")).await);
        assert_eq!(peer.len().await, 1);

        owner.remove(&user("u1"), connection_id).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let result = peer.resolve(&user("u1")).await;
        assert!(matches!(result, Err(RealtimeError::NotFound(_))));
        assert!(peer.is_empty().await);
    }

    #[tokio::test]
    async fn expired_relay_picks_up_new_owner() {
        let shared = Arc::new(MemoryStore::default());
        let make = || {
            ConnectionRegistry::new(
                Arc::clone(&shared) as Arc<dyn HandleStore>,
                Arc::clone(&shared) as Arc<dyn PeerRelay>,
            )
        };
        let first_owner = make();
        let second_owner = make();
        let peer = make().with_relay_ttl(Duration::from_millis(20));

        let (old, _old_rx) = ClientChannel::local(4);
        let old_id = old.connection_id();
        first_owner.register(user("u1"), old).await;
        tokio_test::assert_ok!(peer.resolve(&user("u1")).await);

        first_owner.remove(&user("u1"), old_id).await;
        let (moved, _new_rx) = ClientChannel::local(4);
        let moved_id = moved.connection_id();
        second_owner.register(user("u1"), moved).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let Ok(refreshed) = peer.resolve(&user("u1")).await else {
            panic!("peer should follow the new descriptor");
        };
        assert_eq!(refreshed.connection_id(), moved_id);
    }

    /// Store whose first `put` stalls, letting a later registration's write
    /// land before it.
    #[derive(Debug, Default)]
    struct StallingStore {
        inner: MemoryStore,
        stalled: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl HandleStore for StallingStore {
        async fn put(&self, descriptor: &ChannelDescriptor) -> Result<(), RealtimeError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.put(descriptor).await
        }

        async fn fetch(&self, user_id: &UserId) -> Result<Option<String>, RealtimeError> {
            self.inner.fetch(user_id).await
        }

        async fn remove(&self, user_id: &UserId, connection_id: Uuid) -> Result<bool, RealtimeError> {
            self.inner.remove(user_id, connection_id).await
        }
    }

    #[tokio::test]
    async fn late_descriptor_write_does_not_override_newer_connection() {
        let store = Arc::new(StallingStore::default());
        let relay: Arc<dyn PeerRelay> = Arc::new(MemoryStore::default());
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::clone(&store) as Arc<dyn HandleStore>,
            relay,
        ));

        let (first, _rx1) = ClientChannel::local(4);
        let slow = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.register(user("u1"), first).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (second, _rx2) = ClientChannel::local(4);
        let second_id = second.connection_id();
        registry.register(user("u1"), second).await;
        tokio_test::assert_ok!(slow.await);

        let Ok(Some(raw)) = store.inner.fetch(&user("u1")).await else {
            panic!("descriptor should be stored");
        };
        let Ok(stored) = serde_json::from_str::<ChannelDescriptor>(&raw) else {
            panic!("stored entry is a descriptor");
        };
        assert_eq!(stored.connection_id, second_id);
    }

    #[tokio::test]
    async fn descriptor_written_after_disconnect_is_withdrawn() {
        let store = Arc::new(StallingStore::default());
        let relay: Arc<dyn PeerRelay> = Arc::new(MemoryStore::default());
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::clone(&store) as Arc<dyn HandleStore>,
            relay,
        ));

        let (channel, _rx) = ClientChannel::local(4);
        let connection_id = channel.connection_id();
        let slow = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.register(user("u1"), channel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(registry.remove(&user("u1"), connection_id).await);
        tokio_test::assert_ok!(slow.await);

        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn connection_of_reports_current_connection() {
        let registry = registry_with(Arc::new(CountingStore::default()));
        assert_eq!(registry.connection_of(&user("u1")).await, None);

        let (channel, _rx) = ClientChannel::local(4);
        let connection_id = channel.connection_id();
        registry.register(user("u1"), channel).await;
        assert_eq!(registry.connection_of(&user("u1")).await, Some(connection_id));
    }

    #[tokio::test]
    async fn refresh_skips_closed_channels() {
        let store = Arc::new(CountingStore::default());
        let registry = registry_with(Arc::clone(&store));
        let (open, _rx) = ClientChannel::local(4);
        let (closed, closed_rx) = ClientChannel::local(4);
        registry.register(user("u1"), open).await;
        registry.register(user("u2"), closed).await;
        drop(closed_rx);

        assert_eq!(registry.refresh_descriptors().await, 1);
    }
}
