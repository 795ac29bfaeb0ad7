//! Server-sent event endpoint
//!
//! Accepts subscriber connections over TCP, answers the stream request with
//! event-stream headers and hands the write half to the connection registry.

pub mod config;
pub mod http;
pub mod listener;

pub use config::ServerConfig;
pub use listener::RelayServer;
