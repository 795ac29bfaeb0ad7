//! Connection registry implementation
//!
//! The central set of subscriber connections. Membership changes take the
//! write lock; fan-out takes a snapshot under the read lock and writes outside
//! of it, so slow writes never block registration.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::config::RegistryConfig;
use super::connection::{ConnectionHandle, ConnectionId, Transport};
use super::event::StreamEvent;
use crate::error::DeliveryError;
use crate::record::DetectionRecord;
use crate::stats::{DeliveryReport, RegistryCounters, RegistryStats};

/// Registry of all active subscriber connections
pub struct ConnectionRegistry {
    /// Map of connection id to handle
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,

    /// Configuration
    config: RegistryConfig,

    counters: RegistryCounters,
}

impl ConnectionRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
            counters: RegistryCounters::default(),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new connection writing to `transport`
    pub async fn register(&self, transport: Transport) -> Arc<ConnectionHandle> {
        let id = uuid::Uuid::new_v4().to_string();
        let handle = Arc::new(ConnectionHandle::new(
            id.clone(),
            transport,
            self.config.write_timeout,
        ));

        let mut connections = self.connections.write().await;
        connections.insert(id.clone(), Arc::clone(&handle));
        self.counters.registered.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            connection_id = %id,
            connections = connections.len(),
            "Connection registered"
        );

        handle
    }

    /// Remove and close a connection
    ///
    /// Idempotent. Returns `true` only for the call that tore it down.
    pub async fn unregister(&self, id: &str) -> bool {
        let (removed, remaining) = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(id);
            (removed, connections.len())
        };

        let Some(handle) = removed else {
            return false;
        };

        if !handle.close().await {
            return false;
        }
        self.counters.closed.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            connection_id = %id,
            frames_sent = handle.frames_sent(),
            connections = remaining,
            "Connection closed"
        );

        true
    }

    /// Look up a registered connection
    pub async fn get(&self, id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Whether a connection is registered
    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Number of registered connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Consistent view of the current members
    pub async fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Deliver a record to every registered connection
    ///
    /// Connections that fail or time out are closed; the rest are unaffected.
    pub async fn broadcast(&self, record: &DetectionRecord) -> DeliveryReport {
        self.deliver(StreamEvent::Record(record.clone())).await
    }

    /// Send a keep-alive comment to every registered connection
    pub async fn heartbeat(&self) -> DeliveryReport {
        self.deliver(StreamEvent::Heartbeat).await
    }

    async fn deliver(&self, event: StreamEvent) -> DeliveryReport {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(event = event.kind(), error = %e, "Failed to encode event");
                return DeliveryReport::default();
            }
        };

        let (snapshot, already_closed): (Vec<_>, Vec<_>) = self
            .snapshot()
            .await
            .into_iter()
            .partition(|handle| !handle.is_closed());

        // Closed by a hang-up or a concurrent pass; only needs removing
        for handle in &already_closed {
            self.unregister(handle.id()).await;
        }

        let outcomes = join_all(snapshot.iter().map(|handle| handle.send(&frame))).await;

        let is_record = matches!(event, StreamEvent::Record(_));
        let mut report = DeliveryReport::default();

        for (handle, outcome) in snapshot.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    report.attempted += 1;
                    report.delivered += 1;
                    if is_record {
                        handle.touch();
                    }
                }
                Err(DeliveryError::TransportClosed) => {
                    tracing::debug!(
                        connection_id = %handle.id(),
                        event = event.kind(),
                        "Connection closed before delivery"
                    );
                    self.unregister(handle.id()).await;
                }
                Err(e) => {
                    report.attempted += 1;
                    report.failed += 1;
                    tracing::warn!(
                        connection_id = %handle.id(),
                        event = event.kind(),
                        error = %e,
                        "Delivery failed, closing connection"
                    );
                    self.unregister(handle.id()).await;
                }
            }
        }

        let counter = if is_record {
            &self.counters.records
        } else {
            &self.counters.heartbeats
        };
        counter.fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);

        report
    }

    /// Close connections idle for longer than `connection_timeout`
    ///
    /// Returns the number of connections closed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let timeout = self.config.connection_timeout;

        let expired: Vec<ConnectionId> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|handle| handle.is_expired(now, timeout))
            .map(|handle| handle.id().to_string())
            .collect();

        let mut closed = 0;
        for id in expired {
            if self.unregister(&id).await {
                tracing::info!(connection_id = %id, "Connection expired");
                closed += 1;
            }
        }
        closed
    }

    /// Close every connection
    pub async fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.read().await.keys().cloned().collect();

        let mut closed = 0;
        for id in ids {
            if self.unregister(&id).await {
                closed += 1;
            }
        }
        closed
    }

    /// Current statistics
    pub async fn stats(&self) -> RegistryStats {
        let active = self.connection_count().await;
        self.counters.snapshot(active)
    }

    /// Spawn background expiry task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
