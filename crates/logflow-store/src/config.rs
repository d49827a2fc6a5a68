//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default interval between retention sweeps.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Configuration for [`LogStore`](crate::LogStore).
#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    /// Directory of the database. Ignored when `temporary` is set.
    pub path: Option<PathBuf>,
    /// Use a throwaway database removed on drop.
    pub temporary: bool,
    /// How often expired rows are swept.
    pub gc_interval: Duration,
    /// Flush to disk after every ingested entry.
    pub flush_on_write: bool,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            temporary: true,
            gc_interval: DEFAULT_GC_INTERVAL,
            flush_on_write: false,
        }
    }
}

impl LogStoreConfig {
    /// A persistent store rooted at `path`.
    #[must_use]
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            temporary: false,
            ..Self::default()
        }
    }

    /// A throwaway store.
    #[must_use]
    pub fn temporary() -> Self {
        Self::default()
    }

    /// Sets the sweep interval.
    #[must_use]
    pub const fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Enables or disables flushing after each write.
    #[must_use]
    pub const fn with_flush_on_write(mut self, flush: bool) -> Self {
        self.flush_on_write = flush;
        self
    }

    pub(crate) fn sled_config(&self) -> sled::Config {
        let config = sled::Config::new();
        match (&self.path, self.temporary) {
            (Some(path), false) => config.path(path),
            _ => config.temporary(true),
        }
    }
}
