//! Backing store access
//!
//! The relay only reads from the store: one multi-field record per
//! notification key, plus a topic subscription that announces new keys.
//!
//! ```text
//!   producer ──HSET image_metadata:<ms>──► store ◄──HGETALL── MetadataResolver
//!       │
//!       └──PUBLISH image:metadata:updates "<key>"──► subscribe() ──► NotificationListener
//! ```

pub mod memory;
pub mod redis_client;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use crate::error::StoreError;

pub use self::memory::MemoryStore;
pub use self::redis_client::{resubscribing, subscribe, RedisStore};

/// Stream of raw topic payloads (notification keys)
pub type NotificationStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Read access to per-key text records
pub trait MetadataStore: Send + Sync + 'static {
    /// Fetch every field of the record stored under `key`
    ///
    /// An absent key yields an empty map, mirroring `HGETALL`.
    fn fetch_fields(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<HashMap<String, String>, StoreError>> + Send;
}
