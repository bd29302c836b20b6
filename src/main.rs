//! hyperpage-realtime server entry point.
//!
//! Starts the Axum HTTP server with the REST publishing API and the
//! WebSocket endpoint, plus the dispatcher and relay background tasks.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use hyperpage_realtime::api;
use hyperpage_realtime::app_state::AppState;
use hyperpage_realtime::config::{LogFormat, RealtimeConfig};
use hyperpage_realtime::domain::{ConnectionRegistry, EventBus};
use hyperpage_realtime::persistence::{PostgresPersistence, RowCounter};
use hyperpage_realtime::service::{
    Notifier, spawn_dispatcher, spawn_heartbeat, spawn_relay_listener,
};
use hyperpage_realtime::store::{HandleStore, MemoryStore, PeerRelay, RedisStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = RealtimeConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting hyperpage-realtime");

    // Shared store: Redis when configured, otherwise in-process
    let (store, relay): (Arc<dyn HandleStore>, Arc<dyn PeerRelay>) = match &config.redis_url {
        Some(url) => {
            let redis = Arc::new(
                RedisStore::connect(url, config.redis_key_prefix.clone(), config.handle_ttl_secs)
                    .await
                    .context("failed to connect to Redis")?,
            );
            tracing::info!(prefix = %config.redis_key_prefix, "using redis handle store");
            (
                Arc::clone(&redis) as Arc<dyn HandleStore>,
                redis as Arc<dyn PeerRelay>,
            )
        }
        None => {
            let memory = Arc::new(MemoryStore::new(config.handle_ttl()));
            tracing::info!("REDIS_URL not set, running single-instance");
            (
                Arc::clone(&memory) as Arc<dyn HandleStore>,
                memory as Arc<dyn PeerRelay>,
            )
        }
    };

    // Persistence collaborator for the newblog count
    let counter: Option<Arc<dyn RowCounter>> = if config.persistence_enabled {
        let postgres = PostgresPersistence::connect(&config)
            .await
            .context("failed to connect to PostgreSQL")?;
        Some(Arc::new(postgres))
    } else {
        tracing::warn!("persistence disabled, newblog notifications will fail");
        None
    };

    // Build domain and service layers
    let registry =
        Arc::new(ConnectionRegistry::new(store, relay).with_relay_ttl(config.handle_ttl()));
    let notifier = Arc::new(Notifier::new(
        Arc::clone(&registry),
        counter,
        config.send_timeout(),
    ));
    let event_bus = EventBus::new(config.event_bus_capacity);
    tracing::info!(instance_id = %registry.instance_id(), "registry ready");

    // Background tasks
    let _dispatcher = spawn_dispatcher(Arc::clone(&notifier), event_bus.subscribe());
    let frames = registry
        .listen_for_relays()
        .await
        .context("failed to subscribe to peer relay")?;
    let _relay = spawn_relay_listener(Arc::clone(&registry), frames, notifier.send_timeout());
    let _heartbeat = spawn_heartbeat(Arc::clone(&registry), config.heartbeat_interval());

    // Build application state and router
    let app_state = AppState {
        notifier,
        event_bus,
        client_buffer: config.client_buffer,
    };
    let app = api::build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
