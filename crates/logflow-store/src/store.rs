//! Persistent log storage backed by sled.
//!
//! This module provides:
//! - [`LogStore`] — The store handle: ingestion, stream metadata and queries
//! - [`SharedLogStore`] — Reference-counted handle shared across pipelines
//!
//! Stream metadata operations live in `meta.rs` and queries in `query.rs`.

use std::sync::Arc;

use parking_lot::Mutex;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::codec;
use crate::config::LogStoreConfig;
use crate::error::{Result, StoreError};
use crate::index;
use crate::indexer::Indexer;
use crate::key::{self, EntryKey};
use crate::sweeper;
use crate::types::{LogEntry, StreamConfig};

/// Shared handle to a log store.
pub type SharedLogStore = Arc<LogStore>;

/// Log storage with per-stream retention and field indexes.
///
/// Opening a store spawns two workers on the current Tokio runtime: the
/// [`Indexer`] and the retention sweeper. Both stop on [`LogStore::close`]
/// or when the store is dropped.
pub struct LogStore {
    pub(crate) db: sled::Db,
    config: LogStoreConfig,
    indexer: Indexer,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LogStore {
    /// Opens the store and starts its background workers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoRuntime`] outside a Tokio runtime, or a backend
    /// error if the database cannot be opened.
    pub fn open(config: LogStoreConfig) -> Result<Self> {
        let db = config.sled_config().open()?;
        let shutdown = CancellationToken::new();

        let (indexer, indexer_task) = Indexer::spawn(db.clone(), shutdown.child_token())?;
        let sweeper_task = sweeper::spawn(db.clone(), config.gc_interval, shutdown.child_token())?;

        info!(
            path = ?config.path,
            temporary = config.temporary,
            gc_interval_secs = config.gc_interval.as_secs(),
            "log store opened"
        );

        Ok(Self {
            db,
            config,
            indexer,
            shutdown,
            workers: Mutex::new(vec![indexer_task, sweeper_task]),
        })
    }

    /// Stops the workers and flushes pending writes.
    ///
    /// Jobs still queued on the indexer are discarded.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(error) = worker.await {
                warn!(%error, "store worker ended abnormally");
            }
        }
        self.db.flush_async().await?;
        info!("log store closed");
        Ok(())
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub const fn config(&self) -> &LogStoreConfig {
        &self.config
    }

    /// The background indexer.
    #[must_use]
    pub const fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    // ========================================================================
    // Collector
    // ========================================================================

    /// Persists `entry` in `stream` and returns its key.
    ///
    /// The entry row, one tracking row per field and one index row per
    /// indexed field are written in a single transaction. Index rows share
    /// the entry's expiry. An unknown stream gets a default config.
    /// Entries timestamped before the Unix epoch are rejected.
    pub fn ingest(&self, stream: &str, entry: &LogEntry) -> Result<String> {
        key::validate_stream(stream)?;
        if key::to_millis(entry.timestamp).is_none() {
            return Err(StoreError::InvalidTimestamp {
                stream: stream.to_string(),
                millis: entry.timestamp.timestamp_millis(),
            });
        }

        let entry_key = EntryKey::generate(stream, entry.timestamp).to_string();
        let payload = serde_json::to_vec(entry).map_err(|source| StoreError::Marshal {
            what: format!("log entry for stream '{stream}'"),
            source,
        })?;
        let now = codec::now_secs();

        self.db
            .transaction(|tx| -> ConflictableTransactionResult<(), StoreError> {
                let config = load_or_create_config(tx, stream)?;
                let expires_at = codec::expiry_for(config.retention_time, now);

                tx.insert(entry_key.as_bytes(), codec::encode(expires_at, &payload))?;
                for (field, value) in &entry.fields {
                    tx.insert(key::field_key(stream, field).as_bytes(), Vec::<u8>::new())?;
                    if config.is_indexed(field) {
                        let index_key = key::index_key(stream, field, value, &entry_key);
                        tx.insert(index_key.as_bytes(), codec::encode(expires_at, &[]))?;
                    }
                }
                Ok(())
            })
            .map_err(|error| transaction_error(error, "ingest log entry", stream, &entry_key))?;

        if self.config.flush_on_write {
            self.db.flush().map_err(|source| StoreError::Persist {
                operation: "flush log entry",
                stream: stream.to_string(),
                key: entry_key.clone(),
                source,
            })?;
        }

        trace!(stream, key = %entry_key, fields = entry.fields.len(), "log entry ingested");
        Ok(entry_key)
    }

    // ========================================================================
    // Direct index maintenance
    // ========================================================================

    /// Backfills index rows for `field` synchronously, bypassing the indexer.
    ///
    /// Returns the number of rows written.
    pub fn index_field(&self, stream: &str, field: &str) -> Result<usize> {
        key::validate_stream(stream)?;
        index::backfill(&self.db, stream, field)
    }

    /// Drops index rows for `field` synchronously, bypassing the indexer.
    ///
    /// Returns the number of rows removed.
    pub fn unindex_field(&self, stream: &str, field: &str) -> Result<usize> {
        key::validate_stream(stream)?;
        index::drop_field(&self.db, stream, field)
    }

    /// Removes expired rows now instead of waiting for the next sweep.
    pub fn collect_garbage(&self) -> Result<usize> {
        sweeper::sweep(&self.db, codec::now_secs())
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Reads a stream config inside a transaction, creating a default one.
pub(crate) fn load_or_create_config(
    tx: &TransactionalTree,
    stream: &str,
) -> ConflictableTransactionResult<StreamConfig, StoreError> {
    let config_key = key::config_key(stream);
    match tx.get(config_key.as_bytes())? {
        Some(raw) => parse_config(&config_key, &raw).map_err(ConflictableTransactionError::Abort),
        None => {
            tx.insert(config_key.as_bytes(), Vec::<u8>::new())?;
            Ok(StreamConfig::default())
        }
    }
}

/// An empty row stands for the default config.
pub(crate) fn parse_config(config_key: &str, raw: &[u8]) -> Result<StreamConfig> {
    if raw.is_empty() {
        return Ok(StreamConfig::default());
    }
    serde_json::from_slice(raw).map_err(|source| StoreError::Unmarshal {
        key: config_key.to_string(),
        source,
    })
}

pub(crate) fn transaction_error(
    error: TransactionError<StoreError>,
    operation: &'static str,
    stream: &str,
    key: &str,
) -> StoreError {
    match error {
        TransactionError::Abort(error) => error,
        TransactionError::Storage(source) => StoreError::Persist {
            operation,
            stream: stream.to_string(),
            key: key.to_string(),
            source,
        },
    }
}
