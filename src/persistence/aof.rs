//! Append-Only File
//!
//! Every successful write is journaled as its encoded request array followed
//! by a `\n#\n` separator:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n
//! #
//! *2\r\n$4\r\nINCR\r\n$7\r\ncounter\r\n
//! #
//! ```
//!
//! Connections push records onto a bounded queue through an [`AofSender`].
//! The [`AofWriter`] task drains the queue once per flush interval and appends
//! the batch to disk, so a crash loses at most one interval of writes. On
//! shutdown the writer drains whatever is still queued before it exits.
//!
//! At startup [`recover`] replays the file into the store.

use crate::commands::{CommandError, CommandHandler};
use crate::protocol::{CodecError, RespParser, RespValue};
use crate::storage::StoreError;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Shortest flush interval the writer will run with.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Written after every record.
pub const RECORD_SEPARATOR: &[u8] = b"\n#\n";

/// Errors raised while replaying the AOF.
#[derive(Debug, Error)]
pub enum AofError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed record at byte {offset}: {source}")]
    Codec { offset: usize, source: CodecError },

    #[error("record {record} could not be replayed: {source}")]
    Command { record: usize, source: CommandError },

    #[error("missing record separator at byte {offset}")]
    Corrupt { offset: usize },
}

/// What to do when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OverflowPolicy {
    /// Wait for space. Writers slow down to the disk's pace.
    #[default]
    Block,
    /// Discard the record and log a warning.
    Drop,
}

/// Configuration for the AOF writer.
#[derive(Debug, Clone)]
pub struct AofConfig {
    /// Journal location (default: `commands.aof`)
    pub path: PathBuf,

    /// Time between flushes (default: 1s)
    pub flush_interval: Duration,

    /// Records that may wait in memory (default: 100000)
    pub queue_capacity: usize,

    pub overflow: OverflowPolicy,
}

impl Default for AofConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("commands.aof"),
            flush_interval: Duration::from_secs(1),
            queue_capacity: 100_000,
            overflow: OverflowPolicy::Block,
        }
    }
}

/// Creates the record queue.
///
/// A capacity of zero is raised to one.
pub fn channel(capacity: usize, overflow: OverflowPolicy) -> (AofSender, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = AofSender {
        tx,
        overflow,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

/// The producer side of the record queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AofSender {
    tx: mpsc::Sender<Bytes>,
    overflow: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

impl AofSender {
    /// Queues a record.
    ///
    /// Failures are logged, not returned: the write has already been applied
    /// to the store.
    pub async fn append(&self, record: &RespValue) {
        let encoded = match record.serialize() {
            Ok(encoded) => Bytes::from(encoded),
            Err(e) => {
                error!(error = %e, "Failed to encode AOF record");
                return;
            }
        };

        match self.overflow {
            OverflowPolicy::Block => {
                if self.tx.send(encoded).await.is_err() {
                    warn!("AOF writer has stopped, record not journaled");
                }
            }
            OverflowPolicy::Drop => match self.tx.try_send(encoded) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(dropped, "AOF queue full, record dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("AOF writer has stopped, record not journaled");
                }
            },
        }
    }

    /// Records discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A handle to the running AOF writer.
///
/// When this handle is dropped, the writer is told to stop; use
/// [`AofWriter::shutdown`] to also wait for the final drain.
#[derive(Debug)]
pub struct AofWriter {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl AofWriter {
    /// Starts the writer as a background task.
    pub fn start(rx: mpsc::Receiver<Bytes>, config: &AofConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            path = %config.path.display(),
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            "AOF writer started"
        );

        let task = tokio::spawn(writer_loop(
            rx,
            config.path.clone(),
            config.flush_interval,
            shutdown_rx,
        ));

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the writer to stop without waiting.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the writer and waits until queued records are on disk.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "AOF writer task failed");
            }
        }
        info!("AOF writer stopped");
    }
}

impl Drop for AofWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn writer_loop(
    mut rx: mpsc::Receiver<Bytes>,
    path: PathBuf,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    // Bytes taken off the queue but not yet on disk
    let mut pending = Vec::new();

    loop {
        tokio::select! {
            biased;
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("AOF writer received shutdown signal");
                    break;
                }
            }
            _ = ticker.tick() => {
                flush_pending(&mut rx, &mut pending, &path).await;
            }
        }
    }

    flush_pending(&mut rx, &mut pending, &path).await;
    if !pending.is_empty() {
        error!(bytes = pending.len(), "AOF records lost at shutdown");
    }
}

/// Drains the queue into `pending` and appends it to the file.
///
/// On failure the bytes stay in `pending` and are retried next time.
async fn flush_pending(rx: &mut mpsc::Receiver<Bytes>, pending: &mut Vec<u8>, path: &Path) {
    let mut records = 0usize;
    while let Ok(record) = rx.try_recv() {
        pending.extend_from_slice(&record);
        pending.extend_from_slice(RECORD_SEPARATOR);
        records += 1;
    }

    if pending.is_empty() {
        return;
    }

    match append_to_file(path, pending).await {
        Ok(()) => {
            debug!(records, bytes = pending.len(), "AOF flushed");
            pending.clear();
        }
        Err(e) => error!(path = %path.display(), error = %e, "Failed to write AOF"),
    }
}

async fn append_to_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Replays the AOF at `path` through `handler`.
///
/// A missing file is an empty journal. Returns the number of records read.
pub async fn recover(path: &Path, handler: &CommandHandler) -> Result<usize, AofError> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No AOF found, starting empty");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let records = replay(&contents, handler)?;
    info!(path = %path.display(), records, "AOF replayed");
    Ok(records)
}

/// Replays journal bytes through `handler`.
///
/// A record cut short at the end of the data is skipped with a warning; the
/// writer can be interrupted mid-append. Deletes and increments of keys that
/// expired while the server was down are tolerated.
pub fn replay(contents: &[u8], handler: &CommandHandler) -> Result<usize, AofError> {
    let parser = RespParser::new();
    let mut offset = 0;
    let mut records = 0;

    while offset < contents.len() {
        let parsed = parser
            .parse(&contents[offset..])
            .map_err(|source| AofError::Codec { offset, source })?;

        let Some((request, consumed)) = parsed else {
            warn!(offset, "Ignoring truncated record at end of AOF");
            break;
        };

        let end = offset + consumed;
        let rest = &contents[end..];
        if !rest.starts_with(RECORD_SEPARATOR) {
            if RECORD_SEPARATOR.starts_with(rest) {
                warn!(offset, "Ignoring truncated record at end of AOF");
                break;
            }
            return Err(AofError::Corrupt { offset: end });
        }

        records += 1;
        match handler.execute(request) {
            Ok(_) => {}
            Err(CommandError::Store(StoreError::KeyNotFound | StoreError::KeyExpired)) => {
                debug!(record = records, "Replayed write found no live key");
            }
            Err(source) => {
                return Err(AofError::Command {
                    record: records,
                    source,
                })
            }
        }

        offset = end + RECORD_SEPARATOR.len();
    }

    Ok(records)
}
