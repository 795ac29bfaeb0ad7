//! Detection record and notification key types

use serde::{Deserialize, Serialize};

/// One resolved object detection, as delivered to subscribers
///
/// Serialized with camelCase field names so existing dashboard clients can
/// read it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    /// Producer clock, milliseconds
    pub timestamp: i64,
    /// Bounding box center X
    pub center_x: f64,
    /// Bounding box center Y
    pub center_y: f64,
    /// Bounding box width
    pub width: f64,
    /// Bounding box height
    pub height: f64,
    /// Detection confidence, percent (0-100)
    pub confidence: f64,
    /// Size of the most recently closed frame
    pub people_count: i32,
}

impl DetectionRecord {
    /// Return a copy stamped with a people count
    pub fn with_people_count(self, people_count: i32) -> Self {
        Self {
            people_count,
            ..self
        }
    }
}

/// Key of a pending record in the backing store
///
/// Delivered verbatim as the topic payload, e.g. `image_metadata:1757493783675`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey(String);

impl NotificationKey {
    /// Create a key from a topic payload
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for NotificationKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}
