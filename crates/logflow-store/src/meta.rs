//! Stream metadata: configs, seen fields and stream deletion.

use std::collections::{BTreeMap, BTreeSet};

use sled::transaction::ConflictableTransactionResult;
use tracing::{debug, info};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::index;
use crate::key;
use crate::store::{LogStore, load_or_create_config, parse_config, transaction_error};
use crate::types::StreamConfig;

impl LogStore {
    /// All known streams and their configs.
    pub fn list_streams(&self) -> Result<BTreeMap<String, StreamConfig>> {
        let mut streams = BTreeMap::new();
        for item in self.db.scan_prefix(key::CONFIG_PREFIX.as_bytes()) {
            let (raw_key, raw_value) = item.map_err(|source| StoreError::Query {
                operation: "list streams",
                stream: String::new(),
                source,
            })?;
            let config_key = String::from_utf8_lossy(&raw_key);
            let Some(stream) = config_key.strip_prefix(key::CONFIG_PREFIX) else {
                continue;
            };
            streams.insert(stream.to_string(), parse_config(&config_key, &raw_value)?);
        }
        Ok(streams)
    }

    /// The config of `stream`, created with defaults if the stream is new.
    pub fn get_stream_config(&self, stream: &str) -> Result<StreamConfig> {
        key::validate_stream(stream)?;
        self.db
            .transaction(|tx| load_or_create_config(tx, stream))
            .map_err(|error| transaction_error(error, "get stream config", stream, &key::config_key(stream)))
    }

    /// Replaces the config of `stream`.
    ///
    /// Newly indexed fields are queued for backfill and removed ones for
    /// unindexing. The call returns before the indexer has run, so filtered
    /// queries on a new field only see historical entries once
    /// [`Indexer::sync`](crate::Indexer::sync) has returned.
    pub fn configure_stream(&self, stream: &str, config: StreamConfig) -> Result<()> {
        key::validate_stream(stream)?;
        let config_key = key::config_key(stream);
        let encoded = serde_json::to_vec(&config).map_err(|source| StoreError::Marshal {
            what: format!("stream config '{stream}'"),
            source,
        })?;

        let previous = self
            .db
            .transaction(|tx| -> ConflictableTransactionResult<StreamConfig, StoreError> {
                let previous = load_or_create_config(tx, stream)?;
                tx.insert(config_key.as_bytes(), encoded.clone())?;
                Ok(previous)
            })
            .map_err(|error| transaction_error(error, "configure stream", stream, &config_key))?;

        for field in config.indexed_fields.difference(&previous.indexed_fields) {
            self.indexer().index_field(stream, field);
        }
        for field in previous.indexed_fields.difference(&config.indexed_fields) {
            self.indexer().unindex_field(stream, field);
        }

        info!(
            stream,
            retention_time = config.retention_time,
            retention_size = config.retention_size,
            indexed_fields = config.indexed_fields.len(),
            "stream configured"
        );
        Ok(())
    }

    /// Deletes every entry, index row, field row and the config of `stream`.
    ///
    /// Rows are collected by prefix scan and removed in one atomic batch.
    /// Entries ingested concurrently with the scan may survive.
    pub fn delete_stream(&self, stream: &str) -> Result<()> {
        key::validate_stream(stream)?;
        let mut batch = sled::Batch::default();
        let mut removed = 0usize;

        let prefixes = [
            key::entry_prefix(stream),
            key::index_stream_prefix(stream),
            key::field_prefix(stream),
        ];
        for prefix in &prefixes {
            for item in self.db.scan_prefix(prefix.as_bytes()) {
                let (raw_key, _) = item.map_err(|source| StoreError::Query {
                    operation: "scan stream for deletion",
                    stream: stream.to_string(),
                    source,
                })?;
                batch.remove(raw_key);
                removed += 1;
            }
        }
        let config_key = key::config_key(stream);
        batch.remove(config_key.as_bytes());

        self.db
            .apply_batch(batch)
            .map_err(|source| StoreError::Persist {
                operation: "delete stream",
                stream: stream.to_string(),
                key: config_key,
                source,
            })?;

        info!(stream, rows = removed, "stream deleted");
        Ok(())
    }

    /// Every field name ever ingested into `stream`, sorted.
    pub fn list_stream_fields(&self, stream: &str) -> Result<Vec<String>> {
        key::validate_stream(stream)?;
        let prefix = key::field_prefix(stream);
        let mut fields = BTreeSet::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (raw_key, _) = item.map_err(|source| StoreError::Query {
                operation: "list stream fields",
                stream: stream.to_string(),
                source,
            })?;
            if let Some(field) = String::from_utf8_lossy(&raw_key).strip_prefix(&prefix) {
                fields.insert(field.to_string());
            }
        }
        Ok(fields.into_iter().collect())
    }

    /// Distinct indexed values per field of `stream`, each list sorted.
    pub fn list_stream_indices(&self, stream: &str) -> Result<BTreeMap<String, Vec<String>>> {
        key::validate_stream(stream)?;
        let values = index::distinct_values(&self.db, stream, codec::now_secs())?;
        debug!(stream, fields = values.len(), "listed stream indices");
        Ok(values
            .into_iter()
            .map(|(field, values)| (field, values.into_iter().collect()))
            .collect())
    }
}
