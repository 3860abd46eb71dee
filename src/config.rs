//! Server configuration, read from command-line flags with `PULSEDB_*`
//! environment overrides.

use crate::persistence::{AofConfig, OverflowPolicy};
use crate::storage::SnapshotConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// PulseDB - an in-memory key-value server speaking RESP
#[derive(Parser, Debug, Clone)]
#[command(name = "pulsedb", version, about)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "PULSEDB_HOST", default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PULSEDB_PORT", default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Append-only file replayed at startup
    #[arg(long, env = "PULSEDB_AOF_PATH", default_value = "commands.aof")]
    pub aof_path: PathBuf,

    /// Diagnostic snapshot written by the sweep worker
    #[arg(long, env = "PULSEDB_SNAPSHOT_PATH", default_value = "memory.dat")]
    pub snapshot_path: PathBuf,

    /// How often queued AOF records are written to disk
    #[arg(
        long,
        env = "PULSEDB_AOF_FLUSH_INTERVAL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub aof_flush_interval_ms: u64,

    /// How often expired keys are swept and the snapshot rewritten
    #[arg(
        long,
        env = "PULSEDB_SNAPSHOT_INTERVAL_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub snapshot_interval_secs: u64,

    /// AOF records that may wait in memory between flushes
    #[arg(long, env = "PULSEDB_AOF_QUEUE_CAPACITY", default_value_t = 100_000)]
    pub aof_queue_capacity: usize,

    /// What a write does when the AOF queue is full
    #[arg(long, env = "PULSEDB_AOF_OVERFLOW", value_enum, default_value_t = OverflowPolicy::Block)]
    pub aof_overflow: OverflowPolicy,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, env = "PULSEDB_VERBOSE")]
    pub verbose: bool,
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn aof_config(&self) -> AofConfig {
        AofConfig {
            path: self.aof_path.clone(),
            flush_interval: Duration::from_millis(self.aof_flush_interval_ms),
            queue_capacity: self.aof_queue_capacity,
            overflow: self.aof_overflow,
        }
    }

    pub fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            interval: Duration::from_secs(self.snapshot_interval_secs),
            path: self.snapshot_path.clone(),
        }
    }
}
