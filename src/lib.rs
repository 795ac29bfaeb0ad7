//! # detection-relay
//!
//! Relays object-detection events from a Redis topic to server-sent event
//! subscribers, deriving a people count per capture frame along the way.
//!
//! ```text
//! producer ──► topic message (key) ──► NotificationListener
//!                                         │ MetadataResolver (HGETALL key)
//!                                         │ FrameCounter (people count)
//!                                         ▼
//!                                  ConnectionRegistry.broadcast ──► N SSE streams
//! ```
//!
//! # Example
//!
//! ```no_run
//! use detection_relay::RelayConfig;
//!
//! #[tokio::main]
//! async fn main() -> detection_relay::error::Result<()> {
//!     let config = RelayConfig::default();
//!     detection_relay::relay::run_until(config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod config;
pub mod error;
pub mod frame_counter;
pub mod heartbeat;
pub mod listener;
pub mod record;
pub mod registry;
pub mod relay;
pub mod resolver;
pub mod server;
pub mod stats;
pub mod store;

pub use config::RelayConfig;
pub use error::{ConfigError, DeliveryError, Error, ResolutionError, Result, StoreError};
pub use frame_counter::FrameCounter;
pub use heartbeat::HeartbeatScheduler;
pub use listener::NotificationListener;
pub use record::{DetectionRecord, NotificationKey};
pub use registry::{ConnectionHandle, ConnectionRegistry, RegistryConfig};
pub use resolver::MetadataResolver;
pub use server::{RelayServer, ServerConfig};
pub use store::{MemoryStore, MetadataStore, RedisStore};
