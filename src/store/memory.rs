//! In-process store
//!
//! Holds records in a map guarded by a `std::sync::RwLock`. Used in tests and
//! for running the relay without a Redis instance.

use std::collections::HashMap;
use std::sync::RwLock;

use super::MetadataStore;
use crate::error::StoreError;

/// Hash-of-hashes kept in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) a record
    pub fn insert<I, F, V>(&self, key: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let record = fields
            .into_iter()
            .map(|(f, v)| (f.into(), v.into()))
            .collect();

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(key.into(), record);
    }

    /// Remove a record
    pub fn remove(&self, key: &str) -> bool {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.remove(key).is_some()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataStore for MemoryStore {
    async fn fetch_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(key).cloned().unwrap_or_default())
    }
}
