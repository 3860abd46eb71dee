//! Background Snapshot and Expiry Sweep
//!
//! Lazy expiry only removes a key when somebody touches it. This worker
//! periodically walks the whole store, drops every expired entry, and writes
//! the surviving entries to a diagnostic snapshot file (`memory.dat` by
//! default), one line per key:
//!
//! ```text
//! counter => :12
//! name => $4
//! Ariz
//! ```
//!
//! Each line is `<key> => ` followed by the value's wire encoding. The file is
//! replaced on every pass that finds at least one live key. It is never read
//! back; recovery uses the AOF.

use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Shortest interval the worker will run with.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for the snapshot worker.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Time between passes (default: 10s)
    pub interval: Duration,

    /// Where the snapshot is written (default: `memory.dat`)
    pub path: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            path: PathBuf::from("memory.dat"),
        }
    }
}

/// What a single pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub live: usize,
    pub expired: u64,
    /// False when there were no live keys and the previous file was left alone
    pub written: bool,
}

/// A handle to the running snapshot worker.
///
/// When this handle is dropped, the worker task will be stopped.
#[derive(Debug)]
pub struct SnapshotWorker {
    shutdown_tx: watch::Sender<bool>,
}

impl SnapshotWorker {
    /// Starts the worker as a background task. The first pass runs one
    /// interval after start.
    pub fn start(engine: Arc<StorageEngine>, config: SnapshotConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            path = %config.path.display(),
            interval_ms = config.interval.as_millis() as u64,
            "Snapshot worker started"
        );

        tokio::spawn(snapshot_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the worker.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let signalled = self.shutdown_tx.send_if_modified(|stopped| !std::mem::replace(stopped, true));
        if signalled {
            info!("Snapshot worker stopped");
        }
    }
}

impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn snapshot_loop(
    engine: Arc<StorageEngine>,
    config: SnapshotConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Snapshot worker received shutdown signal");
                    return;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match snapshot_once(&engine, &config.path).await {
            Ok(outcome) => {
                let stats = engine.stats();
                debug!(
                    live = outcome.live,
                    expired = outcome.expired,
                    written = outcome.written,
                    total_expired = stats.expired,
                    "Snapshot pass complete"
                );
            }
            Err(e) => {
                error!(path = %config.path.display(), error = %e, "Failed to write snapshot")
            }
        }
    }
}

/// Runs one sweep and writes the snapshot if any key is live.
pub async fn snapshot_once(engine: &StorageEngine, path: &Path) -> io::Result<SnapshotOutcome> {
    let sweep = engine.sweep();
    let contents = render_snapshot(&sweep.live);

    let written = !contents.is_empty();
    if written {
        tokio::fs::write(path, &contents).await?;
    }

    Ok(SnapshotOutcome {
        live: sweep.live.len(),
        expired: sweep.expired,
        written,
    })
}

/// Renders live entries as `<key> => <encoded value>` records.
pub fn render_snapshot(entries: &[(String, RespValue)]) -> Vec<u8> {
    let mut buf = Vec::new();

    for (key, value) in entries {
        match value.serialize() {
            Ok(encoded) => {
                buf.extend_from_slice(key.as_bytes());
                buf.extend_from_slice(b" => ");
                buf.extend_from_slice(&encoded);
            }
            Err(e) => warn!(key = %key, error = %e, "Skipping entry that cannot be encoded"),
        }
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Entry;
    use bytes::Bytes;
    use std::time::SystemTime;

    #[test]
    fn test_render_snapshot() {
        let entries = vec![
            ("counter".to_string(), RespValue::integer(12)),
            ("name".to_string(), RespValue::bulk_string(Bytes::from("Ariz"))),
        ];

        assert_eq!(
            render_snapshot(&entries),
            b"counter => :12\r\nname => $4\r\nAriz\r\n".to_vec()
        );
        assert!(render_snapshot(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_sweeps_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.dat");
        let engine = StorageEngine::new();

        engine.set("live".to_string(), Entry::new(RespValue::integer(1)));
        engine.set(
            "stale".to_string(),
            Entry::with_expiry(
                RespValue::integer(2),
                SystemTime::now() - Duration::from_secs(1),
            ),
        );

        let outcome = snapshot_once(&engine, &path).await.unwrap();
        assert_eq!(
            outcome,
            SnapshotOutcome {
                live: 1,
                expired: 1,
                written: true
            }
        );
        assert_eq!(engine.len(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"live => :1\r\n");
    }

    #[tokio::test]
    async fn test_empty_store_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.dat");
        std::fs::write(&path, b"old => :1\r\n").unwrap();

        let engine = StorageEngine::new();
        let outcome = snapshot_once(&engine, &path).await.unwrap();

        assert!(!outcome.written);
        assert_eq!(std::fs::read(&path).unwrap(), b"old => :1\r\n");
    }

    #[tokio::test]
    async fn test_worker_cleans_expired_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.dat");
        let engine = Arc::new(StorageEngine::new());

        for i in 0..10 {
            engine.set(
                format!("key{}", i),
                Entry::with_expiry(
                    RespValue::integer(i),
                    SystemTime::now() + Duration::from_millis(30),
                ),
            );
        }
        engine.set("persistent".to_string(), Entry::new(RespValue::integer(0)));

        let config = SnapshotConfig {
            interval: Duration::from_millis(20),
            path: path.clone(),
        };
        let _worker = SnapshotWorker::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(engine.len(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"persistent => :0\r\n");
    }

    #[tokio::test]
    async fn test_worker_stops_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.dat");
        let engine = Arc::new(StorageEngine::new());

        {
            let config = SnapshotConfig {
                interval: Duration::from_millis(10),
                path: path.clone(),
            };
            let _worker = SnapshotWorker::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        engine.set("key".to_string(), Entry::new(RespValue::integer(1)));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(!path.exists());
    }
}
