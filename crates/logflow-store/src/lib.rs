//! # logflow-store
//!
//! Per-stream log storage with field indexes and retention.
//!
//! This crate provides:
//!
//! - [`LogEntry`] — Timestamped record of string fields
//! - [`StreamConfig`] — Retention time, retention size and indexed fields
//! - [`Filter`] — Boolean field expressions, evaluated on entries or indexes
//! - [`LogStore`] — sled-backed storage: ingest, stream metadata, queries
//! - [`Indexer`] — Background worker backfilling and dropping field indexes
//! - [`EntryKey`] — Time-ordered entry key codec
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use logflow_store::{Filter, LogEntry, LogStore, LogStoreConfig, StreamConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LogStore::open(LogStoreConfig::temporary())?;
//! store.configure_stream("app", StreamConfig::default().with_indexed_field("level"))?;
//!
//! let entry = LogEntry::new(Default::default()).with_field("level", "error");
//! store.ingest("app", &entry)?;
//!
//! let now = Utc::now();
//! let errors = store.fetch_logs(
//!     "app",
//!     now - Duration::minutes(5),
//!     now,
//!     Some(&Filter::field_exact("level", "error")),
//! )?;
//! assert_eq!(errors.len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
pub mod config;
pub mod error;
pub mod filter;
mod index;
pub mod indexer;
pub mod key;
mod meta;
mod query;
pub mod store;
mod sweeper;
pub mod types;

// Re-export main types
pub use config::{DEFAULT_GC_INTERVAL, LogStoreConfig};
pub use error::{Result, StoreError};
pub use filter::Filter;
pub use indexer::Indexer;
pub use key::EntryKey;
pub use store::{LogStore, SharedLogStore};
pub use types::{LogEntry, StreamConfig};
