//! Periodic keep-alive sweep
//!
//! Every `heartbeat_interval` a comment frame is written to each registered
//! connection. A failed heartbeat closes the connection exactly like a failed
//! record delivery, which surfaces dead peers even when no records flow.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::registry::ConnectionRegistry;
use crate::stats::DeliveryReport;

/// Drives heartbeats for a registry
pub struct HeartbeatScheduler {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl HeartbeatScheduler {
    /// Create a scheduler using the registry's configured interval
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let interval = registry.config().heartbeat_interval;
        Self { registry, interval }
    }

    /// Override the interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Heartbeat interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep
    pub async fn tick(&self) -> DeliveryReport {
        let report = self.registry.heartbeat().await;

        if report.failed > 0 {
            tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                "Heartbeat closed dead connections"
            );
        } else {
            tracing::debug!(delivered = report.delivered, "Heartbeat sent");
        }

        report
    }

    /// Spawn the sweep loop
    ///
    /// The first heartbeat goes out one interval after spawning. Returns a
    /// handle that can be used to abort the task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::registry::RegistryConfig;

    #[tokio::test]
    async fn test_tick_removes_dead_connections() {
        let registry = Arc::new(ConnectionRegistry::new());

        let (alive_client, alive_server) = tokio::io::duplex(1024);
        let (dead_client, dead_server) = tokio::io::duplex(1024);
        let alive = registry.register(Box::new(alive_server)).await;
        let dead = registry.register(Box::new(dead_server)).await;
        drop(dead_client);

        let scheduler = HeartbeatScheduler::new(Arc::clone(&registry));
        let report = scheduler.tick().await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(dead.is_closed());
        assert!(!alive.is_closed());

        registry.unregister(alive.id()).await;
        let mut received = Vec::new();
        let mut alive_client = alive_client;
        alive_client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b":heartbeat\n\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_schedule() {
        let config = RegistryConfig::default().heartbeat_interval(Duration::from_secs(25));
        let registry = Arc::new(ConnectionRegistry::with_config(config));

        let (_client, server) = tokio::io::duplex(1024);
        let handle = registry.register(Box::new(server)).await;

        let scheduler = HeartbeatScheduler::new(Arc::clone(&registry));
        assert_eq!(scheduler.interval(), Duration::from_secs(25));
        let task = scheduler.spawn();

        tokio::time::sleep(Duration::from_secs(24)).await;
        assert_eq!(handle.frames_sent(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.frames_sent(), 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(handle.frames_sent(), 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_connection_gets_no_heartbeats() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (_client, server) = tokio::io::duplex(1024);
        let handle = registry.register(Box::new(server)).await;

        let task = HeartbeatScheduler::new(Arc::clone(&registry))
            .with_interval(Duration::from_secs(1))
            .spawn();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(handle.frames_sent(), 1);

        registry.unregister(handle.id()).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.frames_sent(), 1);

        task.abort();
    }
}
