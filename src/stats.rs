//! Counters for the relay's message path and fan-out

use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Open connections written to
    pub attempted: usize,
    /// Successful writes
    pub delivered: usize,
    /// Failed writes (those connections were closed)
    pub failed: usize,
}

/// Connection registry statistics
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Currently registered connections
    pub active_connections: usize,
    /// Connections registered since start
    pub registered_total: u64,
    /// Connections torn down since start
    pub closed_total: u64,
    /// Records written to a connection
    pub records_delivered: u64,
    /// Heartbeats written to a connection
    pub heartbeats_delivered: u64,
    /// Writes that failed and closed their connection
    pub delivery_failures: u64,
}

/// Notification listener statistics
#[derive(Debug, Clone, Default)]
pub struct ListenerStats {
    /// Notifications received from the topic
    pub received: u64,
    /// Notifications resolved into records
    pub resolved: u64,
    /// Notifications dropped because resolution failed
    pub dropped: u64,
}

impl ListenerStats {
    /// Fraction of received notifications that were dropped
    pub fn drop_rate(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.dropped as f64 / self.received as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RegistryCounters {
    pub registered: AtomicU64,
    pub closed: AtomicU64,
    pub records: AtomicU64,
    pub heartbeats: AtomicU64,
    pub failures: AtomicU64,
}

impl RegistryCounters {
    pub fn snapshot(&self, active_connections: usize) -> RegistryStats {
        RegistryStats {
            active_connections,
            registered_total: self.registered.load(Ordering::Relaxed),
            closed_total: self.closed.load(Ordering::Relaxed),
            records_delivered: self.records.load(Ordering::Relaxed),
            heartbeats_delivered: self.heartbeats.load(Ordering::Relaxed),
            delivery_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ListenerCounters {
    pub received: AtomicU64,
    pub resolved: AtomicU64,
    pub dropped: AtomicU64,
}

impl ListenerCounters {
    pub fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            received: self.received.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
