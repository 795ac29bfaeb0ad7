//! Top-level wiring
//!
//! ```text
//!   redis SUBSCRIBE ──► NotificationListener ──► ConnectionRegistry ◄── RelayServer
//!        HGETALL ◄──────┘                          ▲        ▲
//!                                   HeartbeatScheduler    cleanup task
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::error::{ConfigError, Result, StoreError};
use crate::frame_counter::FrameCounter;
use crate::heartbeat::HeartbeatScheduler;
use crate::listener::NotificationListener;
use crate::registry::ConnectionRegistry;
use crate::server::RelayServer;
use crate::store::{self, MetadataStore, NotificationStream, RedisStore};

/// Run the relay against Redis until `shutdown` resolves
///
/// Configuration and the initial store connection are checked before anything
/// is spawned; either failing prevents startup.
pub async fn run_until<F>(config: RelayConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    config.validate()?;

    let client = redis::Client::open(config.redis_url.as_str())
        .map_err(|e| ConfigError::InvalidStoreUrl(e.to_string()))?;
    let store = RedisStore::connect(&client).await?;
    let subscription = store::subscribe(&client, &config.channel).await?;
    let notifications = store::resubscribing(
        client.clone(),
        config.channel.as_str(),
        subscription,
        config.resubscribe_backoff,
    );

    tracing::info!(
        redis = %config.redis_url,
        channel = %config.channel,
        "Connected to store"
    );

    run_with(config, store, notifications, shutdown).await
}

/// Run the relay with an arbitrary store and notification stream
///
/// Returns [`StoreError::SubscriptionClosed`] if `notifications` ends before
/// `shutdown` resolves; every subscriber is closed first.
pub async fn run_with<S, F>(
    config: RelayConfig,
    store: S,
    notifications: NotificationStream,
    shutdown: F,
) -> Result<()>
where
    S: MetadataStore,
    F: Future<Output = ()>,
{
    config.validate()?;

    let registry = Arc::new(ConnectionRegistry::with_config(config.registry.clone()));
    let server = RelayServer::new(config.server.clone(), Arc::clone(&registry));
    let listener = server.bind().await?;

    let cleanup_handle = registry.spawn_cleanup_task();
    let heartbeat_handle = HeartbeatScheduler::new(Arc::clone(&registry)).spawn();

    let notification_listener = NotificationListener::new(
        store,
        FrameCounter::with_window(config.same_frame_window_ms),
        Arc::clone(&registry),
    );
    let mut listener_handle = tokio::spawn(async move {
        notification_listener.run(notifications).await;
    });

    let result = tokio::select! {
        result = server.serve_until(listener, shutdown) => result,
        _ = &mut listener_handle => {
            tracing::error!(channel = %config.channel, "Notification stream ended, stopping relay");
            let closed = registry.close_all().await;
            tracing::info!(connections = closed, "Server stopped");
            Err(StoreError::SubscriptionClosed.into())
        }
    };

    listener_handle.abort();
    heartbeat_handle.abort();
    cleanup_handle.abort();

    result
}
