//! Error types for the log notifier.

use thiserror::Error;

/// Errors returned by [`LogNotifier`](crate::LogNotifier).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The notifier worker has stopped.
    #[error("log notifier closed")]
    Closed,

    /// The worker dropped a subscription before acknowledging it.
    #[error("subscription to stream '{0}' was not acknowledged")]
    Registration(String),

    /// The notifier worker needs a Tokio runtime to be spawned on.
    #[error("no tokio runtime available to spawn the log notifier")]
    NoRuntime,
}

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
