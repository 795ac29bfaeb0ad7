//! Notification key to detection record resolution
//!
//! A record is stored as six text fields. Resolution is all-or-nothing: either
//! every field parses or the whole record is rejected.

use std::collections::HashMap;

use crate::error::ResolutionError;
use crate::record::{DetectionRecord, NotificationKey};
use crate::store::MetadataStore;

pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_CENTER_X: &str = "center_x";
pub const FIELD_CENTER_Y: &str = "center_y";
pub const FIELD_WIDTH: &str = "width";
pub const FIELD_HEIGHT: &str = "height";
pub const FIELD_CONFIDENCE: &str = "confidence";

/// Reads and parses detection records from a [`MetadataStore`]
pub struct MetadataResolver<S> {
    store: S,
}

impl<S: MetadataStore> MetadataResolver<S> {
    /// Create a resolver over a store
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Resolve a key into a record with `people_count` left at 0
    pub async fn resolve(&self, key: &NotificationKey) -> Result<DetectionRecord, ResolutionError> {
        if key.as_str().is_empty() {
            return Err(ResolutionError::MissingKey(String::new()));
        }

        let fields = self.store.fetch_fields(key.as_str()).await?;
        if fields.is_empty() {
            return Err(ResolutionError::MissingKey(key.to_string()));
        }

        parse_record(key, &fields)
    }
}

/// Parse the six required fields of a stored record
pub fn parse_record(
    key: &NotificationKey,
    fields: &HashMap<String, String>,
) -> Result<DetectionRecord, ResolutionError> {
    let number = |field: &'static str| parse_f64(key, fields, field);

    Ok(DetectionRecord {
        timestamp: parse_timestamp(key, fields)?,
        center_x: number(FIELD_CENTER_X)?,
        center_y: number(FIELD_CENTER_Y)?,
        width: number(FIELD_WIDTH)?,
        height: number(FIELD_HEIGHT)?,
        confidence: number(FIELD_CONFIDENCE)?,
        people_count: 0,
    })
}

fn field<'a>(
    key: &NotificationKey,
    fields: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, ResolutionError> {
    fields
        .get(name)
        .map(|v| v.trim())
        .ok_or_else(|| ResolutionError::MalformedField {
            key: key.to_string(),
            field: name,
            value: None,
        })
}

fn malformed(key: &NotificationKey, name: &'static str, value: &str) -> ResolutionError {
    ResolutionError::MalformedField {
        key: key.to_string(),
        field: name,
        value: Some(value.to_string()),
    }
}

fn parse_f64(
    key: &NotificationKey,
    fields: &HashMap<String, String>,
    name: &'static str,
) -> Result<f64, ResolutionError> {
    let raw = field(key, fields, name)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(malformed(key, name, raw)),
    }
}

/// Integer milliseconds, or a finite decimal truncated toward zero
fn parse_timestamp(
    key: &NotificationKey,
    fields: &HashMap<String, String>,
) -> Result<i64, ResolutionError> {
    let raw = field(key, fields, FIELD_TIMESTAMP)?;
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }

    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= i64::MIN as f64 && v <= i64::MAX as f64 => Ok(v as i64),
        _ => Err(malformed(key, FIELD_TIMESTAMP, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const KEY: &str = "image_metadata:1757493783675";

    fn full_record() -> Vec<(&'static str, &'static str)> {
        vec![
            ("timestamp", "1757493783675"),
            ("center_x", "10.0"),
            ("center_y", "20.25"),
            ("width", "400.0"),
            ("height", "300.5"),
            ("confidence", "87.34"),
        ]
    }

    #[tokio::test]
    async fn test_resolve_full_record() {
        let store = MemoryStore::new();
        store.insert(KEY, full_record());
        let resolver = MetadataResolver::new(store);

        let record = resolver.resolve(&KEY.into()).await.unwrap();
        assert_eq!(record.timestamp, 1757493783675);
        assert_eq!(record.center_x, 10.0);
        assert_eq!(record.center_y, 20.25);
        assert_eq!(record.width, 400.0);
        assert_eq!(record.height, 300.5);
        assert_eq!(record.confidence, 87.34);
        assert_eq!(record.people_count, 0);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let resolver = MetadataResolver::new(MemoryStore::new());
        let result = resolver.resolve(&KEY.into()).await;
        assert!(matches!(result, Err(ResolutionError::MissingKey(k)) if k == KEY));

        let result = resolver.resolve(&"".into()).await;
        assert!(matches!(result, Err(ResolutionError::MissingKey(_))));
    }

    #[tokio::test]
    async fn test_missing_confidence() {
        let store = MemoryStore::new();
        store.insert(
            KEY,
            full_record().into_iter().filter(|(f, _)| *f != "confidence"),
        );
        let resolver = MetadataResolver::new(store);

        let result = resolver.resolve(&KEY.into()).await;
        assert!(matches!(
            result,
            Err(ResolutionError::MalformedField {
                field: "confidence",
                value: None,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_non_numeric_field() {
        let store = MemoryStore::new();
        let mut fields = full_record();
        fields[3] = ("width", "wide");
        store.insert(KEY, fields);
        let resolver = MetadataResolver::new(store);

        let result = resolver.resolve(&KEY.into()).await;
        assert!(matches!(
            result,
            Err(ResolutionError::MalformedField { field: "width", value: Some(ref v), .. }) if v == "wide"
        ));
    }

    #[test]
    fn test_decimal_timestamp_truncates() {
        let key = NotificationKey::from(KEY);
        let mut fields: HashMap<String, String> = full_record()
            .into_iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();

        fields.insert("timestamp".into(), "1757493783675.9".into());
        assert_eq!(parse_record(&key, &fields).unwrap().timestamp, 1757493783675);

        fields.insert("timestamp".into(), "1.7574937836750E12".into());
        assert_eq!(parse_record(&key, &fields).unwrap().timestamp, 1757493783675);
    }

    #[test]
    fn test_non_finite_rejected() {
        let key = NotificationKey::from(KEY);
        let mut fields: HashMap<String, String> = full_record()
            .into_iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();

        fields.insert("confidence".into(), "NaN".into());
        assert!(parse_record(&key, &fields).is_err());

        fields.insert("confidence".into(), "50".into());
        fields.insert("timestamp".into(), "inf".into());
        assert!(parse_record(&key, &fields).is_err());
    }

    #[test]
    fn test_surrounding_whitespace_accepted() {
        let key = NotificationKey::from(KEY);
        let mut fields: HashMap<String, String> = full_record()
            .into_iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        fields.insert("height".into(), " 12.5 ".into());

        assert_eq!(parse_record(&key, &fields).unwrap().height, 12.5);
    }
}
