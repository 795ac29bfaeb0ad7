//! Topic notification handling
//!
//! Each topic message carries one notification key. Messages are handled one
//! at a time in delivery order: resolve the record, stamp it with the people
//! count, broadcast it. A message that cannot be resolved is logged and
//! dropped; the next message is handled regardless.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};

use crate::frame_counter::FrameCounter;
use crate::record::{DetectionRecord, NotificationKey};
use crate::registry::ConnectionRegistry;
use crate::resolver::MetadataResolver;
use crate::stats::{DeliveryReport, ListenerCounters, ListenerStats};
use crate::store::MetadataStore;

/// Turns topic notifications into broadcasts
pub struct NotificationListener<S> {
    resolver: MetadataResolver<S>,
    counter: FrameCounter,
    registry: Arc<ConnectionRegistry>,
    counters: ListenerCounters,
}

impl<S: MetadataStore> NotificationListener<S> {
    /// Create a listener with its own frame counter
    pub fn new(store: S, counter: FrameCounter, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            resolver: MetadataResolver::new(store),
            counter,
            registry,
            counters: ListenerCounters::default(),
        }
    }

    /// Get the registry records are broadcast to
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the frame counter
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.counter
    }

    /// Current statistics
    pub fn stats(&self) -> ListenerStats {
        self.counters.snapshot()
    }

    /// Handle one topic payload
    ///
    /// Returns the broadcast record and its delivery report, or `None` if the
    /// message was dropped.
    pub async fn handle_message(&self, payload: &str) -> Option<(DetectionRecord, DeliveryReport)> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let key = NotificationKey::from(payload);

        tracing::debug!(key = %key, "Notification received");

        let record = match self.resolver.resolve(&key).await {
            Ok(record) => record,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Dropping notification");
                return None;
            }
        };
        self.counters.resolved.fetch_add(1, Ordering::Relaxed);

        let people_count = self.counter.count(record.timestamp);
        let record = record.with_people_count(people_count);

        let report = self.registry.broadcast(&record).await;

        tracing::debug!(
            key = %key,
            timestamp = record.timestamp,
            people = people_count,
            delivered = report.delivered,
            failed = report.failed,
            "Record broadcast"
        );

        Some((record, report))
    }

    /// Handle messages until the stream ends
    ///
    /// Each message is fully handled before the next one is pulled.
    pub async fn run<M>(&self, messages: M)
    where
        M: Stream<Item = String>,
    {
        let mut messages = std::pin::pin!(messages);

        while let Some(payload) = messages.next().await {
            self.handle_message(&payload).await;
        }

        let stats = self.stats();
        tracing::info!(
            received = stats.received,
            resolved = stats.resolved,
            dropped = stats.dropped,
            drop_rate = stats.drop_rate(),
            "Notification stream ended"
        );
    }
}
