//! Periodic removal of expired rows.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::key;

/// Deletes every entry and index row that expired at or before `now`.
///
/// Returns the number of rows removed.
pub(crate) fn sweep(db: &sled::Db, now: u64) -> Result<usize> {
    let mut batch = sled::Batch::default();
    let mut removed = 0;

    for prefix in [key::ENTRY_PREFIX, key::INDEX_PREFIX] {
        for item in db.scan_prefix(prefix.as_bytes()) {
            let (raw_key, raw_value) = item?;
            let expired = match codec::decode(&raw_key, &raw_value) {
                Ok(row) => row.is_expired(now),
                Err(error) => {
                    error!(%error, "removing corrupted row");
                    true
                }
            };
            if expired {
                batch.remove(raw_key);
                removed += 1;
            }
        }
    }

    if removed > 0 {
        db.apply_batch(batch).map_err(StoreError::Backend)?;
    }
    Ok(removed)
}

/// Spawns the periodic sweep task.
pub(crate) fn spawn(
    db: sled::Db,
    interval: Duration,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
    Ok(runtime.spawn(run(db, interval, shutdown)))
}

async fn run(db: sled::Db, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let db = db.clone();
        match tokio::task::spawn_blocking(move || sweep(&db, codec::now_secs())).await {
            Ok(Ok(0)) => debug!("retention sweep found nothing to remove"),
            Ok(Ok(removed)) => info!(removed, "retention sweep removed expired rows"),
            Ok(Err(error)) => error!(%error, "retention sweep failed"),
            Err(error) => error!(%error, "retention sweep panicked"),
        }
    }
    debug!("retention sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> sled::Db {
        sled::Config::new().temporary(true).open().expect("open temporary db")
    }

    fn put(db: &sled::Db, key: &[u8], value: Vec<u8>) {
        db.insert(key, value).expect("insert row");
    }

    #[test]
    fn sweep_removes_only_expired_rows() {
        let db = temp_db();
        put(&db, b"entry:app:00000000000000000001:a", codec::encode(50, b"{}"));
        put(&db, b"entry:app:00000000000000000002:b", codec::encode(0, b"{}"));
        put(&db, b"index:app:field:level:ZXJyb3I=:entry:app:00000000000000000001:a", codec::encode(50, &[]));
        put(&db, b"entry:app:00000000000000000003:c", codec::encode(500, b"{}"));

        assert_eq!(sweep(&db, 100).expect("sweep"), 2);
        assert!(db.get(b"entry:app:00000000000000000001:a").expect("read").is_none());
        assert!(db.get(b"entry:app:00000000000000000002:b").expect("read").is_some());
        assert!(db.get(b"entry:app:00000000000000000003:c").expect("read").is_some());
    }

    #[test]
    fn sweep_leaves_config_rows() {
        let db = temp_db();
        put(&db, b"stream:config:app", Vec::new());
        put(&db, b"stream:field:app:level", Vec::new());
        assert_eq!(sweep(&db, u64::MAX).expect("sweep"), 0);
        assert!(db.get(b"stream:config:app").expect("read").is_some());
    }

    #[test]
    fn sweep_removes_corrupted_rows() {
        let db = temp_db();
        put(&db, b"entry:app:bad", b"xy".to_vec());
        assert_eq!(sweep(&db, 0).expect("sweep"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sweep_runs_until_shutdown() {
        let db = temp_db();
        put(&db, b"entry:app:00000000000000000001:a", codec::encode(1, b"{}"));

        let shutdown = CancellationToken::new();
        let handle = spawn(db.clone(), Duration::from_secs(60), shutdown.clone()).expect("spawn sweeper");

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_secs(61)).await;
            if db.get(b"entry:app:00000000000000000001:a").expect("read").is_none() {
                break;
            }
        }
        assert!(db.get(b"entry:app:00000000000000000001:a").expect("read").is_none());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper stops")
            .expect("sweeper task");
    }
}
