//! Error types
//!
//! Errors are grouped by the boundary that contains them:
//!
//! - [`ResolutionError`]: one notification could not be turned into a record.
//!   The message is dropped and the listener keeps going.
//! - [`DeliveryError`]: one connection could not be written. That connection is
//!   torn down, nobody else is affected.
//! - [`ConfigError`]: the relay cannot start.

use std::fmt;
use std::io;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket bind, accept)
    Io(io::Error),
    /// Invalid configuration
    Config(ConfigError),
    /// Backing store error
    Store(StoreError),
    /// Record resolution failed
    Resolution(ResolutionError),
    /// Delivery to a connection failed
    Delivery(DeliveryError),
    /// JSON encoding failed
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Resolution(e) => write!(f, "Resolution error: {}", e),
            Error::Delivery(e) => write!(f, "Delivery error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Store(e) => Some(e),
            Error::Resolution(e) => Some(e),
            Error::Delivery(e) => Some(e),
            Error::Json(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

impl From<ResolutionError> for Error {
    fn from(e: ResolutionError) -> Self {
        Error::Resolution(e)
    }
}

impl From<DeliveryError> for Error {
    fn from(e: DeliveryError) -> Self {
        Error::Delivery(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

/// Backing store failure (connection lost, protocol error)
#[derive(Debug, Clone)]
pub enum StoreError {
    /// The store backend reported an error
    Backend(String),
    /// The subscription stream ended
    SubscriptionClosed,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "{}", msg),
            StoreError::SubscriptionClosed => write!(f, "Subscription closed"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Failure to turn a notification key into a detection record
#[derive(Debug, Clone)]
pub enum ResolutionError {
    /// No record (or an empty one) is stored under the key
    MissingKey(String),
    /// A required field is absent or not a valid number
    MalformedField {
        key: String,
        field: &'static str,
        value: Option<String>,
    },
    /// The store could not be read
    Store(StoreError),
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::MissingKey(key) => write!(f, "No record stored under key: {}", key),
            ResolutionError::MalformedField {
                key,
                field,
                value: Some(value),
            } => write!(f, "Field '{}' of {} is not numeric: {:?}", field, key, value),
            ResolutionError::MalformedField {
                key,
                field,
                value: None,
            } => write!(f, "Field '{}' missing from {}", field, key),
            ResolutionError::Store(e) => write!(f, "Store read failed: {}", e),
        }
    }
}

impl std::error::Error for ResolutionError {}

impl From<StoreError> for ResolutionError {
    fn from(e: StoreError) -> Self {
        ResolutionError::Store(e)
    }
}

/// Failure to write a frame to one connection
#[derive(Debug)]
pub enum DeliveryError {
    /// The connection was already closed
    TransportClosed,
    /// The write did not complete in time
    WriteTimeout(Duration),
    /// The transport returned an error
    Io(io::Error),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::TransportClosed => write!(f, "Transport closed"),
            DeliveryError::WriteTimeout(t) => write!(f, "Write timed out after {:?}", t),
            DeliveryError::Io(e) => write!(f, "Write failed: {}", e),
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeliveryError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DeliveryError {
    fn from(e: io::Error) -> Self {
        DeliveryError::Io(e)
    }
}

/// Invalid startup configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is out of range
    InvalidValue { field: &'static str, reason: String },
    /// The store URL could not be parsed
    InvalidStoreUrl(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for {}: {}", field, reason)
            }
            ConfigError::InvalidStoreUrl(msg) => write!(f, "Invalid store URL: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
