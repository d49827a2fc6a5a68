//! Notifier configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`LogNotifier`](crate::LogNotifier).
///
/// Missing keys take their default when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Capacity of the worker's command queue.
    pub mailbox_capacity: usize,
    /// Messages buffered per subscriber before deliveries are dropped.
    pub subscriber_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            subscriber_capacity: 256,
        }
    }
}

impl NotifierConfig {
    /// Sets the command queue capacity.
    #[must_use]
    pub const fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Sets the per-subscriber buffer.
    #[must_use]
    pub const fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity;
        self
    }

    /// Tokio channels panic on a zero capacity.
    pub(crate) fn sanitized(self) -> Self {
        Self {
            mailbox_capacity: self.mailbox_capacity.max(1),
            subscriber_capacity: self.subscriber_capacity.max(1),
        }
    }
}
