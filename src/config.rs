//! Relay configuration

use std::time::Duration;

use crate::error::ConfigError;
use crate::frame_counter::DEFAULT_SAME_FRAME_WINDOW_MS;
use crate::registry::RegistryConfig;
use crate::server::ServerConfig;

/// Default store connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Topic that announces new detection records
pub const DEFAULT_CHANNEL: &str = "image:metadata:updates";

/// First delay before resubscribing after the topic subscription is lost
pub const DEFAULT_RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(1);

/// Complete relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Store connection URL
    pub redis_url: String,

    /// Notification topic
    pub channel: String,

    /// Timestamps at most this far apart belong to the same frame
    pub same_frame_window_ms: i64,

    /// Initial delay between resubscribe attempts; doubles up to 30s
    pub resubscribe_backoff: Duration,

    /// Event stream endpoint
    pub server: ServerConfig,

    /// Connection lifecycle
    pub registry: RegistryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            same_frame_window_ms: DEFAULT_SAME_FRAME_WINDOW_MS,
            resubscribe_backoff: DEFAULT_RESUBSCRIBE_BACKOFF,
            server: ServerConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Set the store URL
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Set the notification topic
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set the same-frame window
    pub fn same_frame_window_ms(mut self, window_ms: i64) -> Self {
        self.same_frame_window_ms = window_ms;
        self
    }

    /// Set the initial resubscribe delay
    pub fn resubscribe_backoff(mut self, backoff: Duration) -> Self {
        self.resubscribe_backoff = backoff;
        self
    }

    /// Set the server configuration
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Set the registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Check every value before anything is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.trim().is_empty() {
            return Err(invalid("channel", "must not be empty"));
        }
        if self.same_frame_window_ms < 0 {
            return Err(invalid("same_frame_window_ms", "must not be negative"));
        }
        if !self.server.stream_path.starts_with('/') {
            return Err(invalid("server.stream_path", "must start with '/'"));
        }

        non_zero("registry.heartbeat_interval", self.registry.heartbeat_interval)?;
        non_zero("registry.connection_timeout", self.registry.connection_timeout)?;
        non_zero("registry.write_timeout", self.registry.write_timeout)?;
        non_zero("registry.cleanup_interval", self.registry.cleanup_interval)?;
        non_zero("server.request_timeout", self.server.request_timeout)?;
        non_zero("resubscribe_backoff", self.resubscribe_backoff)?;

        redis::Client::open(self.redis_url.as_str())
            .map_err(|e| ConfigError::InvalidStoreUrl(e.to_string()))?;

        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn non_zero(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        Err(invalid(field, "must be greater than zero"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();

        assert_eq!(config.channel, "image:metadata:updates");
        assert_eq!(config.same_frame_window_ms, 3);
        assert_eq!(config.registry.heartbeat_interval, Duration::from_millis(25_000));
        assert_eq!(config.registry.connection_timeout, Duration::from_millis(300_000));
        assert_eq!(config.resubscribe_backoff, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_resubscribe_backoff() {
        let config = RelayConfig::default().resubscribe_backoff(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "resubscribe_backoff", .. })
        ));
    }

    #[test]
    fn test_rejects_empty_channel() {
        let config = RelayConfig::default().channel("  ");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "channel", .. })
        ));
    }

    #[test]
    fn test_rejects_negative_window() {
        let config = RelayConfig::default().same_frame_window_ms(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = RelayConfig::default()
            .registry(RegistryConfig::default().heartbeat_interval(Duration::ZERO));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "registry.heartbeat_interval",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_bad_store_url() {
        let config = RelayConfig::default().redis_url("not a url");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStoreUrl(_))
        ));
    }

    #[test]
    fn test_rejects_relative_stream_path() {
        let config =
            RelayConfig::default().server(ServerConfig::default().stream_path("events"));
        assert!(config.validate().is_err());
    }
}
