//! Background tasks that keep cross-instance delivery working.
//!
//! - The relay listener writes frames forwarded by peers to local sockets.
//! - The heartbeat refreshes this instance's descriptors in the shared
//!   store so they expire only when the instance stops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{ConnectionRegistry, RelayFrame};

/// Spawns the relay listener over an already-subscribed frame stream.
pub fn spawn_relay_listener(
    registry: Arc<ConnectionRegistry>,
    mut frames: mpsc::Receiver<RelayFrame>,
    send_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let user_id = frame.user_id.clone();
            if let Err(e) = registry.deliver_local(frame, send_timeout).await {
                tracing::info!(%user_id, error = %e, "relayed frame not delivered");
            }
        }
        tracing::info!("relay listener stopped");
    })
}

/// Spawns the descriptor heartbeat.
pub fn spawn_heartbeat(registry: Arc<ConnectionRegistry>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate first tick; registration already published.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let refreshed = registry.refresh_descriptors().await;
            tracing::trace!(refreshed, "channel descriptors refreshed");
        }
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ClientChannel, UserId};
    use crate::store::{HandleStore, MemoryStore, PeerRelay};

    fn user(raw: &str) -> UserId {
        let Ok(id) = UserId::parse(raw) else {
            panic!("valid user id");
        };
        id
    }

    #[tokio::test]
    async fn listener_delivers_peer_frames() {
        let shared = Arc::new(MemoryStore::default());
        let owner = Arc::new(ConnectionRegistry::new(
            Arc::clone(&shared) as Arc<dyn HandleStore>,
            Arc::clone(&shared) as Arc<dyn PeerRelay>,
        ));
        let peer = ConnectionRegistry::new(
            Arc::clone(&shared) as Arc<dyn HandleStore>,
            shared as Arc<dyn PeerRelay>,
        );

        let Ok(frames) = owner.listen_for_relays().await else {
            panic!("listen failed");
        };
        let _listener =
            spawn_relay_listener(Arc::clone(&owner), frames, Duration::from_millis(100));

        let (channel, mut rx) = ClientChannel::local(4);
        owner.register(user("u1"), channel).await;

        let Ok(remote) = peer.resolve(&user("u1")).await else {
            panic!("peer resolves through the store");
        };
        tokio_test::assert_ok!(
            remote
                .send_text(&user("u1"), "ping".to_string(), Duration::from_millis(100))
                .await
        );

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(frame.ok().flatten().as_deref(), Some("ping"));
    }
}
