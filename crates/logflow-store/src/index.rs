//! Field index rows.
//!
//! One row exists per (indexed field, value, entry). Rows carry the same
//! expiry as the entry they point to, so an index never outlives its data.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::key;
use crate::types::LogEntry;

const BATCH_SIZE: usize = 1024;

/// Entry keys whose `field` was indexed with exactly `value`.
pub(crate) fn keys_for_value(
    tree: &sled::Tree,
    stream: &str,
    field: &str,
    value: &str,
    now: u64,
) -> Result<Vec<String>> {
    let prefix = key::index_value_prefix(stream, field, value);
    let mut keys = Vec::new();

    for item in tree.scan_prefix(prefix.as_bytes()) {
        let (raw_key, raw_value) = item.map_err(|source| StoreError::Query {
            operation: "scan field index",
            stream: stream.to_string(),
            source,
        })?;
        if codec::decode(&raw_key, &raw_value)?.is_expired(now) {
            continue;
        }
        let Ok(index_key) = std::str::from_utf8(&raw_key) else {
            continue;
        };
        if let Some(entry_key) = index_key.strip_prefix(&prefix) {
            if entry_key.starts_with(key::ENTRY_PREFIX) {
                keys.push(entry_key.to_string());
            }
        }
    }

    Ok(keys)
}

/// Creates index rows for `field` over every live entry of `stream`.
///
/// Entries without the field are skipped. Returns the number of rows written.
pub(crate) fn backfill(tree: &sled::Tree, stream: &str, field: &str) -> Result<usize> {
    let now = codec::now_secs();
    let mut batch = sled::Batch::default();
    let mut pending = 0;
    let mut written = 0;

    for item in tree.scan_prefix(key::entry_prefix(stream).as_bytes()) {
        let (raw_key, raw_value) = item.map_err(|source| StoreError::Query {
            operation: "scan entries for indexing",
            stream: stream.to_string(),
            source,
        })?;
        let row = codec::decode(&raw_key, &raw_value)?;
        if row.is_expired(now) {
            continue;
        }
        let entry_key = String::from_utf8_lossy(&raw_key);
        let entry: LogEntry = match serde_json::from_slice(row.payload) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(stream, key = %entry_key, %error, "skipping unreadable entry during backfill");
                continue;
            }
        };
        let Some(value) = entry.field(field) else {
            continue;
        };

        let index_key = key::index_key(stream, field, value, &entry_key);
        batch.insert(index_key.as_bytes(), codec::encode(row.expires_at, &[]));
        pending += 1;

        if pending == BATCH_SIZE {
            apply(tree, stream, field, std::mem::take(&mut batch))?;
            written += pending;
            pending = 0;
        }
    }

    if pending > 0 {
        apply(tree, stream, field, batch)?;
        written += pending;
    }

    debug!(stream, field, rows = written, "field index backfilled");
    Ok(written)
}

/// Deletes every index row of `field` in `stream` in one atomic batch.
pub(crate) fn drop_field(tree: &sled::Tree, stream: &str, field: &str) -> Result<usize> {
    let prefix = key::index_field_prefix(stream, field);
    let mut batch = sled::Batch::default();
    let mut removed = 0;

    for item in tree.scan_prefix(prefix.as_bytes()) {
        let (raw_key, _) = item.map_err(|source| StoreError::Query {
            operation: "scan field index",
            stream: stream.to_string(),
            source,
        })?;
        let belongs_to_field = std::str::from_utf8(&raw_key)
            .ok()
            .and_then(|k| k.strip_prefix(&prefix))
            .and_then(key::split_index_remainder)
            .is_some();
        if belongs_to_field {
            batch.remove(raw_key);
            removed += 1;
        }
    }

    apply(tree, stream, field, batch)?;
    debug!(stream, field, rows = removed, "field index dropped");
    Ok(removed)
}

/// Distinct live values per indexed field of `stream`.
pub(crate) fn distinct_values(
    tree: &sled::Tree,
    stream: &str,
    now: u64,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let prefix = key::index_stream_prefix(stream);
    // "entry:<stream>:" + 20 digits + ":" + hyphenated uuid
    let entry_key_len = key::entry_prefix(stream).len() + 20 + 1 + 36;
    let mut values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for item in tree.scan_prefix(prefix.as_bytes()) {
        let (raw_key, raw_value) = item.map_err(|source| StoreError::Query {
            operation: "list stream indices",
            stream: stream.to_string(),
            source,
        })?;
        if codec::decode(&raw_key, &raw_value)?.is_expired(now) {
            continue;
        }
        let Some(remainder) = std::str::from_utf8(&raw_key)
            .ok()
            .and_then(|k| k.strip_prefix(&prefix))
        else {
            continue;
        };
        let Some(head_len) = remainder.len().checked_sub(entry_key_len + 1) else {
            continue;
        };
        let Some((field, encoded)) = remainder
            .get(..head_len)
            .and_then(|head| head.rsplit_once(':'))
        else {
            continue;
        };
        if let Some(value) = key::decode_index_value(encoded) {
            values.entry(field.to_string()).or_default().insert(value);
        }
    }

    Ok(values)
}

fn apply(tree: &sled::Tree, stream: &str, field: &str, batch: sled::Batch) -> Result<()> {
    tree.apply_batch(batch).map_err(|source| StoreError::Persist {
        operation: "update field index",
        stream: stream.to_string(),
        key: key::index_field_prefix(stream, field),
        source,
    })
}
