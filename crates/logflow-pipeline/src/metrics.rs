//! Pipeline and stream counters.
//!
//! [`PipelineMetrics`] counts pipeline runs by outcome and entries routed
//! into each stream. Counters only grow; callers that export them take a
//! [`MetricsSnapshot`].

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::Serialize;

/// Run counters of one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    /// Runs that completed without error
    pub succeeded: u64,
    /// Runs that returned an error
    pub failed: u64,
}

impl PipelineCounters {
    /// Total number of runs.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Counters by pipeline name
    pub pipelines: BTreeMap<String, PipelineCounters>,
    /// Routed entries by stream name
    pub streams: BTreeMap<String, u64>,
}

/// Thread-safe counters shared by every run of a [`PipelineRunner`](crate::PipelineRunner).
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pipelines: RwLock<HashMap<String, PipelineCounters>>,
    streams: RwLock<HashMap<String, u64>>,
}

impl PipelineMetrics {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one run of `pipeline`.
    pub fn record_pipeline(&self, pipeline: &str, success: bool) {
        let mut pipelines = self.pipelines.write();
        let counters = pipelines.entry(pipeline.to_string()).or_default();
        if success {
            counters.succeeded += 1;
        } else {
            counters.failed += 1;
        }
    }

    /// Counts one entry routed into `stream`.
    pub fn record_stream(&self, stream: &str) {
        *self.streams.write().entry(stream.to_string()).or_default() += 1;
    }

    /// Counters of `pipeline`, zero if it never ran.
    #[must_use]
    pub fn pipeline(&self, pipeline: &str) -> PipelineCounters {
        self.pipelines.read().get(pipeline).copied().unwrap_or_default()
    }

    /// Entries routed into `stream`.
    #[must_use]
    pub fn stream(&self, stream: &str) -> u64 {
        self.streams.read().get(stream).copied().unwrap_or_default()
    }

    /// Copies every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pipelines: self
                .pipelines
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            streams: self
                .streams
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_pipeline_outcomes() {
        let metrics = PipelineMetrics::new();
        metrics.record_pipeline("main", true);
        metrics.record_pipeline("main", true);
        metrics.record_pipeline("main", false);

        let counters = metrics.pipeline("main");
        assert_eq!(counters.succeeded, 2);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.total(), 3);
        assert_eq!(metrics.pipeline("other"), PipelineCounters::default());
    }

    #[test]
    fn counts_streams() {
        let metrics = PipelineMetrics::new();
        metrics.record_stream("errors");
        metrics.record_stream("errors");
        metrics.record_stream("all");

        assert_eq!(metrics.stream("errors"), 2);
        assert_eq!(metrics.stream("all"), 1);
        assert_eq!(metrics.stream("missing"), 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.streams.keys().collect::<Vec<_>>(), vec!["all", "errors"]);
        assert!(snapshot.pipelines.is_empty());
    }

    #[test]
    fn concurrent_updates() {
        let metrics = Arc::new(PipelineMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_stream("s");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("recording thread");
        }
        assert_eq!(metrics.stream("s"), 800);
    }
}
