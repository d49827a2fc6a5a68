//! Time-range queries with index-driven filtering.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sled::IVec;
use tracing::debug;

use crate::codec;
use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::index;
use crate::key;
use crate::store::LogStore;
use crate::types::LogEntry;

impl LogStore {
    /// Entries of `stream` with `from <= timestamp <= to` at millisecond
    /// precision, newest first.
    ///
    /// A filter is resolved against the field index only. Entries whose
    /// fields were not indexed when they were ingested never match a field
    /// filter, and `Not` is relative to the entries inside the window.
    pub fn fetch_logs(
        &self,
        stream: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        filter: Option<&Filter>,
    ) -> Result<Vec<LogEntry>> {
        key::validate_stream(stream)?;
        let now = codec::now_secs();

        let candidates = self.scan_window(stream, from, to, now)?;
        let keys: BTreeSet<&String> = candidates.keys().collect();
        let survivors = match filter {
            Some(filter) => IndexEvaluator {
                tree: &self.db,
                stream,
                now,
                candidates: &keys,
            }
            .evaluate(filter)?,
            None => keys.clone(),
        };

        let mut entries = Vec::with_capacity(survivors.len());
        for entry_key in survivors.into_iter().rev() {
            let Some(raw) = candidates.get(entry_key) else {
                continue;
            };
            let row = codec::decode(entry_key.as_bytes(), raw)?;
            let entry = serde_json::from_slice(row.payload).map_err(|source| StoreError::Unmarshal {
                key: entry_key.clone(),
                source,
            })?;
            entries.push(entry);
        }

        debug!(
            stream,
            candidates = candidates.len(),
            returned = entries.len(),
            filtered = filter.is_some(),
            "fetched logs"
        );
        Ok(entries)
    }

    /// Live entry rows whose key falls in the window.
    fn scan_window(
        &self,
        stream: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        now: u64,
    ) -> Result<BTreeMap<String, IVec>> {
        let mut rows = BTreeMap::new();
        if from > to {
            return Ok(rows);
        }

        // No entry is stored before the epoch.
        let Some(to_millis) = key::to_millis(to) else {
            return Ok(rows);
        };
        let lower = key::entry_time_bound(stream, key::to_millis(from).unwrap_or(0));
        let upper = key::entry_time_bound(stream, to_millis.saturating_add(1));

        for item in self.db.range(lower.as_bytes()..upper.as_bytes()) {
            let (raw_key, raw_value) = item.map_err(|source| StoreError::Query {
                operation: "scan entries",
                stream: stream.to_string(),
                source,
            })?;
            if codec::decode(&raw_key, &raw_value)?.is_expired(now) {
                continue;
            }
            rows.insert(String::from_utf8_lossy(&raw_key).into_owned(), raw_value);
        }
        Ok(rows)
    }
}

/// Resolves a filter to the subset of candidate keys it matches.
struct IndexEvaluator<'s, 'k> {
    tree: &'s sled::Tree,
    stream: &'s str,
    now: u64,
    candidates: &'s BTreeSet<&'k String>,
}

impl<'k> IndexEvaluator<'_, 'k> {
    fn evaluate(&self, filter: &Filter) -> Result<BTreeSet<&'k String>> {
        match filter {
            Filter::And(filters) => {
                let mut matched = self.candidates.clone();
                for filter in filters {
                    if matched.is_empty() {
                        break;
                    }
                    let inner = self.evaluate(filter)?;
                    matched.retain(|k| inner.contains(k));
                }
                Ok(matched)
            }
            Filter::Or(filters) => {
                let mut matched = BTreeSet::new();
                for filter in filters {
                    matched.extend(self.evaluate(filter)?);
                }
                Ok(matched)
            }
            Filter::Not(inner) => {
                let excluded = self.evaluate(inner)?;
                Ok(self
                    .candidates
                    .iter()
                    .filter(|k| !excluded.contains(*k))
                    .copied()
                    .collect())
            }
            Filter::FieldExact { field, value } => self.lookup(field, std::slice::from_ref(value)),
            Filter::FieldIn { field, values } => self.lookup(field, values),
        }
    }

    fn lookup(&self, field: &str, values: &[String]) -> Result<BTreeSet<&'k String>> {
        let mut matched = BTreeSet::new();
        for value in values {
            for entry_key in index::keys_for_value(self.tree, self.stream, field, value, self.now)? {
                if let Some(candidate) = self.candidates.get(&entry_key) {
                    matched.insert(*candidate);
                }
            }
        }
        Ok(matched)
    }
}
