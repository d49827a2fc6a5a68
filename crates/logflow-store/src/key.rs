//! Key layout of the store.
//!
//! ```text
//! entry:<stream>:<millis, 20 digits>:<uuid>                  log entry
//! index:<stream>:field:<field>:<base64(value)>:<entry key>   field index row
//! stream:config:<stream>                                     stream config
//! stream:field:<stream>:<field>                              seen field
//! ```
//!
//! Zero-padded milliseconds make lexicographic key order equal to
//! chronological order within a stream.

use crate::error::{Result, StoreError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

pub(crate) const ENTRY_PREFIX: &str = "entry:";
pub(crate) const INDEX_PREFIX: &str = "index:";
pub(crate) const CONFIG_PREFIX: &str = "stream:config:";

/// Key of a stored log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    stream: String,
    millis: u64,
    id: Uuid,
}

impl EntryKey {
    /// Generates a fresh key for an entry of `stream` at `timestamp`.
    ///
    /// Timestamps before the Unix epoch sort as the epoch. The store never
    /// writes such keys; [`LogStore::ingest`](crate::LogStore::ingest)
    /// rejects pre-epoch entries.
    #[must_use]
    pub fn generate(stream: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            stream: stream.to_string(),
            millis: to_millis(timestamp).unwrap_or(0),
            id: Uuid::new_v4(),
        }
    }

    /// Parses an encoded entry key.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(ENTRY_PREFIX)?;
        let (rest, id) = rest.rsplit_once(':')?;
        let (stream, millis) = rest.rsplit_once(':')?;
        if stream.is_empty() || millis.len() != 20 {
            return None;
        }
        Some(Self {
            stream: stream.to_string(),
            millis: millis.parse().ok()?,
            id: Uuid::parse_str(id).ok()?,
        })
    }

    /// The stream this key belongs to.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub const fn millis(&self) -> u64 {
        self.millis
    }

    /// The unique suffix.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ENTRY_PREFIX}{}:{:020}:{}", self.stream, self.millis, self.id)
    }
}

/// Rejects stream names that would break prefix scans.
pub(crate) fn validate_stream(stream: &str) -> Result<()> {
    let reason = if stream.is_empty() {
        "must not be empty"
    } else if stream.contains(':') {
        "must not contain ':'"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidStream {
        stream: stream.to_string(),
        reason,
    })
}

/// Milliseconds since the Unix epoch, `None` before it.
pub(crate) fn to_millis(timestamp: DateTime<Utc>) -> Option<u64> {
    u64::try_from(timestamp.timestamp_millis()).ok()
}

pub(crate) fn entry_prefix(stream: &str) -> String {
    format!("{ENTRY_PREFIX}{stream}:")
}

/// Smallest possible key of an entry at `millis`.
pub(crate) fn entry_time_bound(stream: &str, millis: u64) -> String {
    format!("{ENTRY_PREFIX}{stream}:{millis:020}:")
}

pub(crate) fn index_stream_prefix(stream: &str) -> String {
    format!("{INDEX_PREFIX}{stream}:field:")
}

pub(crate) fn index_field_prefix(stream: &str, field: &str) -> String {
    format!("{INDEX_PREFIX}{stream}:field:{field}:")
}

pub(crate) fn index_value_prefix(stream: &str, field: &str, value: &str) -> String {
    format!("{INDEX_PREFIX}{stream}:field:{field}:{}:", STANDARD.encode(value))
}

pub(crate) fn index_key(stream: &str, field: &str, value: &str, entry_key: &str) -> String {
    format!("{}{entry_key}", index_value_prefix(stream, field, value))
}

/// Splits the part of an index key following its field prefix into the
/// encoded value and the entry key.
///
/// Returns `None` when the remainder does not belong to the field, which
/// happens when another field name extends this one past a `:`.
pub(crate) fn split_index_remainder(remainder: &str) -> Option<(&str, &str)> {
    let (encoded, entry_key) = remainder.split_once(':')?;
    entry_key.starts_with(ENTRY_PREFIX).then_some((encoded, entry_key))
}

pub(crate) fn decode_index_value(encoded: &str) -> Option<String> {
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

pub(crate) fn config_key(stream: &str) -> String {
    format!("{CONFIG_PREFIX}{stream}")
}

pub(crate) fn field_prefix(stream: &str) -> String {
    format!("stream:field:{stream}:")
}

pub(crate) fn field_key(stream: &str, field: &str) -> String {
    format!("stream:field:{stream}:{field}")
}
