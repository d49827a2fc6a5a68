//! Error types for the log store.

use thiserror::Error;

/// Errors that can occur while storing, indexing or querying logs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write to the backend failed.
    #[error("failed to {operation} in stream '{stream}' (key '{key}'): {source}")]
    Persist {
        /// The operation that was attempted.
        operation: &'static str,
        /// The stream being written to.
        stream: String,
        /// The key being written.
        key: String,
        /// The backend error.
        #[source]
        source: sled::Error,
    },

    /// A read or scan against the backend failed.
    #[error("failed to {operation} for stream '{stream}': {source}")]
    Query {
        /// The operation that was attempted.
        operation: &'static str,
        /// The stream being read.
        stream: String,
        /// The backend error.
        #[source]
        source: sled::Error,
    },

    /// A value could not be serialized.
    #[error("failed to marshal {what}: {source}")]
    Marshal {
        /// What was being serialized.
        what: String,
        /// The serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be deserialized.
    #[error("failed to unmarshal value at '{key}': {source}")]
    Unmarshal {
        /// The key of the stored value.
        key: String,
        /// The deserializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A stored row does not have the expected layout.
    #[error("corrupted row at '{key}': {reason}")]
    Corrupted {
        /// The key of the row.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The stream name cannot be used as a key segment.
    #[error("invalid stream name '{stream}': {reason}")]
    InvalidStream {
        /// The rejected name.
        stream: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The entry timestamp cannot be encoded in an entry key.
    #[error("invalid timestamp {millis}ms for stream '{stream}': entries before the Unix epoch are not stored")]
    InvalidTimestamp {
        /// The stream being written to.
        stream: String,
        /// Milliseconds since the Unix epoch.
        millis: i64,
    },

    /// Background workers need a Tokio runtime to be spawned on.
    #[error("no tokio runtime available to spawn store workers")]
    NoRuntime,

    /// The background indexer is no longer running.
    #[error("indexer stopped")]
    IndexerStopped,

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
