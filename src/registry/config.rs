//! Registry configuration

use std::time::Duration;

/// Default keep-alive interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(25_000);

/// Default idle timeout for a connection
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Default bound on a single frame write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default expiry sweep interval
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(1_000);

/// Configuration for the connection registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Interval between heartbeat sweeps
    pub heartbeat_interval: Duration,

    /// Connections with no successful record delivery for this long are closed
    pub connection_timeout: Duration,

    /// Maximum time a single write (including waiting for the connection's
    /// write lock) may take before the connection is considered dead
    pub write_timeout: Duration,

    /// How often expired connections are swept
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl RegistryConfig {
    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the connection idle timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the per-write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the expiry sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
