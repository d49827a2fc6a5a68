//! # logflow-notify
//!
//! Live delivery of ingested log entries to per-stream subscribers.
//!
//! This crate provides:
//!
//! - [`LogNotifier`] — Worker handle: subscribe and notify
//! - [`Subscription`] — Receiving side, ended by its cancellation token
//! - [`LogMessage`] — Stream, key and entry of a delivered log
//!
//! ## Example
//!
//! ```rust
//! use logflow_notify::{LogNotifier, NotifierConfig};
//! use logflow_store::LogEntry;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (notifier, _worker) = LogNotifier::spawn(NotifierConfig::default())?;
//!
//! let cancel = CancellationToken::new();
//! let mut subscription = notifier.subscribe("app", &cancel).await?;
//!
//! let entry = LogEntry::new(Default::default()).with_field("message", "hello");
//! notifier.notify("app", "entry:app:1", entry).await?;
//!
//! let message = subscription.recv().await;
//! assert_eq!(message.map(|m| m.key), Some("entry:app:1".to_string()));
//!
//! cancel.cancel();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod notifier;

// Re-export main types
pub use config::NotifierConfig;
pub use error::{NotifyError, Result};
pub use notifier::{LogMessage, LogNotifier, Subscription};
