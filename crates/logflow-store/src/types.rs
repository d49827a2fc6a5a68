//! Core types for the log store.
//!
//! This module provides:
//! - [`LogEntry`] — A timestamped record of string fields
//! - [`StreamConfig`] — Per-stream retention and indexing settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A single log record: a timestamp plus a flat map of string fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the log was produced
    pub timestamp: DateTime<Utc>,
    /// Structured fields
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self {
            timestamp: Utc::now(),
            fields,
        }
    }

    /// Creates an entry with an explicit timestamp.
    #[must_use]
    pub fn at(timestamp: DateTime<Utc>, fields: HashMap<String, String>) -> Self {
        Self { timestamp, fields }
    }

    /// Adds or replaces a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns the value of a field, if present.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Retention and indexing settings of a stream.
///
/// A zero `retention_time` means entries never expire. `retention_size` is
/// persisted for callers but not enforced by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Seconds an entry is kept after ingestion (0 = forever)
    #[serde(rename = "ttl", default)]
    pub retention_time: u64,
    /// Size budget in megabytes (0 = unlimited)
    #[serde(rename = "size", default)]
    pub retention_size: u64,
    /// Fields that get index rows on ingestion
    #[serde(default)]
    pub indexed_fields: BTreeSet<String>,
}

impl StreamConfig {
    /// Sets the retention time in seconds.
    #[must_use]
    pub const fn with_retention_time(mut self, seconds: u64) -> Self {
        self.retention_time = seconds;
        self
    }

    /// Sets the retention size in megabytes.
    #[must_use]
    pub const fn with_retention_size(mut self, megabytes: u64) -> Self {
        self.retention_size = megabytes;
        self
    }

    /// Marks a field as indexed.
    #[must_use]
    pub fn with_indexed_field(mut self, field: impl Into<String>) -> Self {
        self.indexed_fields.insert(field.into());
        self
    }

    /// Returns true if ingested values of `field` get index rows.
    #[must_use]
    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexed_fields.contains(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn log_entry_json_shape() {
        let ts = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");

        let entry = LogEntry::at(ts, HashMap::new()).with_field("level", "error");
        let json = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(json["fields"]["level"], "error");
    }

    #[test]
    fn log_entry_missing_fields_defaults_to_empty() {
        let entry: LogEntry =
            serde_json::from_str(r#"{"timestamp":"2024-05-01T12:00:00Z"}"#).expect("parse entry");
        assert!(entry.fields.is_empty());
    }

    #[test]
    fn log_entry_field_lookup() {
        let entry = LogEntry::new(HashMap::new()).with_field("host", "web-1");
        assert_eq!(entry.field("host"), Some("web-1"));
        assert_eq!(entry.field("missing"), None);
    }

    #[test]
    fn stream_config_json_keys() {
        let config = StreamConfig::default()
            .with_retention_time(3600)
            .with_retention_size(10)
            .with_indexed_field("level");
        let json = serde_json::to_value(&config).expect("serialize config");
        assert_eq!(json["ttl"], 3600);
        assert_eq!(json["size"], 10);
        assert_eq!(json["indexed_fields"], serde_json::json!(["level"]));
    }

    #[test]
    fn stream_config_empty_object_is_default() {
        let parsed: StreamConfig = serde_json::from_str("{}").expect("parse config");
        assert_eq!(parsed, StreamConfig::default());
    }

    #[test]
    fn stream_config_is_indexed() {
        let config = StreamConfig::default().with_indexed_field("level");
        assert!(config.is_indexed("level"));
        assert!(!config.is_indexed("host"));
    }
}
