//! Background worker that builds and drops field indexes.
//!
//! Jobs are processed one at a time in submission order. Submitting never
//! blocks and never fails the caller; job failures are logged.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Result, StoreError};
use crate::index;

/// A unit of work for the indexer.
#[derive(Debug)]
enum IndexJob {
    Index { stream: String, field: String },
    Unindex { stream: String, field: String },
    Sync(oneshot::Sender<()>),
}

/// Handle to the indexer worker.
#[derive(Debug, Clone)]
pub struct Indexer {
    tx: mpsc::UnboundedSender<IndexJob>,
}

impl Indexer {
    /// Spawns the worker on the current Tokio runtime.
    pub(crate) fn spawn(
        db: sled::Db,
        shutdown: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>)> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = IndexWorker { db, rx, shutdown };
        let handle = runtime.spawn(worker.run());
        Ok((Self { tx }, handle))
    }

    /// Queues a backfill of index rows for `field` in `stream`.
    pub fn index_field(&self, stream: &str, field: &str) {
        self.submit(IndexJob::Index {
            stream: stream.to_string(),
            field: field.to_string(),
        });
    }

    /// Queues removal of every index row of `field` in `stream`.
    pub fn unindex_field(&self, stream: &str, field: &str) {
        self.submit(IndexJob::Unindex {
            stream: stream.to_string(),
            field: field.to_string(),
        });
    }

    /// Waits until every job queued before this call has been processed.
    pub async fn sync(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(IndexJob::Sync(done_tx))
            .map_err(|_| StoreError::IndexerStopped)?;
        done_rx.await.map_err(|_| StoreError::IndexerStopped)
    }

    fn submit(&self, job: IndexJob) {
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            error!(?job, "indexer stopped, dropping job");
        }
    }
}

struct IndexWorker {
    db: sled::Db,
    rx: mpsc::UnboundedReceiver<IndexJob>,
    shutdown: CancellationToken,
}

impl IndexWorker {
    async fn run(mut self) {
        debug!("indexer started");
        loop {
            let job = tokio::select! {
                () = self.shutdown.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.handle(job).await;
        }
        debug!("indexer stopped");
    }

    async fn handle(&self, job: IndexJob) {
        match job {
            IndexJob::Index { stream, field } => {
                let db = self.db.clone();
                let (s, f) = (stream.clone(), field.clone());
                let outcome = tokio::task::spawn_blocking(move || index::backfill(&db, &s, &f)).await;
                match outcome {
                    Ok(Ok(rows)) => info!(%stream, %field, rows, "field indexed"),
                    Ok(Err(error)) => error!(%stream, %field, %error, "failed to index field"),
                    Err(error) => error!(%stream, %field, %error, "index job panicked"),
                }
            }
            IndexJob::Unindex { stream, field } => {
                let db = self.db.clone();
                let (s, f) = (stream.clone(), field.clone());
                let outcome = tokio::task::spawn_blocking(move || index::drop_field(&db, &s, &f)).await;
                match outcome {
                    Ok(Ok(rows)) => info!(%stream, %field, rows, "field unindexed"),
                    Ok(Err(error)) => error!(%stream, %field, %error, "failed to unindex field"),
                    Err(error) => error!(%stream, %field, %error, "unindex job panicked"),
                }
            }
            IndexJob::Sync(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::key;

    fn temp_db() -> sled::Db {
        sled::Config::new().temporary(true).open().expect("open temporary db")
    }

    #[test]
    fn spawn_without_runtime_fails() {
        let result = Indexer::spawn(temp_db(), CancellationToken::new());
        assert!(matches!(result, Err(StoreError::NoRuntime)));
    }

    #[tokio::test]
    async fn jobs_run_in_order() {
        let db = temp_db();
        let entry_key = key::EntryKey::generate("app", chrono::Utc::now()).to_string();
        let payload = br#"{"timestamp":"2024-05-01T12:00:00Z","fields":{"level":"error"}}"#;
        db.insert(entry_key.as_bytes(), codec::encode(0, payload))
            .expect("insert entry");

        let (indexer, _handle) = Indexer::spawn(db.clone(), CancellationToken::new()).expect("spawn indexer");

        indexer.index_field("app", "level");
        indexer.sync().await.expect("sync indexer");
        let now = codec::now_secs();
        let keys = index::keys_for_value(&db, "app", "level", "error", now).expect("lookup");
        assert_eq!(keys.len(), 1);

        indexer.index_field("app", "level");
        indexer.unindex_field("app", "level");
        indexer.sync().await.expect("sync indexer");
        let keys = index::keys_for_value(&db, "app", "level", "error", now).expect("lookup");
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn sync_after_shutdown_reports_stopped() {
        let shutdown = CancellationToken::new();
        let (indexer, handle) = Indexer::spawn(temp_db(), shutdown.clone()).expect("spawn indexer");

        shutdown.cancel();
        handle.await.expect("indexer task");
        assert!(matches!(indexer.sync().await, Err(StoreError::IndexerStopped)));
    }
}
