//! Connection registry for subscriber fan-out
//!
//! The registry owns every subscriber connection and delivers detection
//! records and heartbeats to them.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ConnectionRegistry>
//!                   ┌──────────────────────────────┐
//!                   │ connections: HashMap<Id,     │
//!                   │   Arc<ConnectionHandle {     │
//!                   │     transport: Mutex<..>,    │
//!                   │   }>                         │
//!                   │ >                            │
//!                   └──────────────┬───────────────┘
//!                                  │ snapshot()
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!   [Listener]              [HeartbeatScheduler]      [cleanup task]
//!   broadcast(record)       heartbeat()               cleanup()
//!         │                        │                        │
//!         └──► handle.send() ◄─────┘                 unregister()
//!               (per-connection lock, write timeout)
//! ```
//!
//! # Zero-Copy Design
//!
//! An event is encoded once into `bytes::Bytes`; every connection writes the
//! same reference-counted buffer.
//!
//! # Failure isolation
//!
//! Writes to different connections run concurrently and each is bounded by
//! `write_timeout`. A connection whose write fails or times out is unregistered
//! and its transport shut down; no other connection sees the failure.

pub mod config;
pub mod connection;
pub mod event;
pub mod store;

pub use config::RegistryConfig;
pub use connection::{ConnectionHandle, ConnectionId, ConnectionState, Transport};
pub use event::{StreamEvent, HEARTBEAT_FRAME};
pub use store::ConnectionRegistry;
