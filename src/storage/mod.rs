//! Storage Engine Module
//!
//! This module holds the data PulseDB serves: a key-value store with
//! per-key expiry, plus the background worker that sweeps expired keys and
//! writes a diagnostic snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │              StorageEngine                │
//! │   RwLock<HashMap<String, Entry>>          │
//! │   Entry = value + optional expiry         │
//! └───────────────────────────────────────────┘
//!          ▲                        ▲
//!          │ get/set/delete/incr    │ sweep
//!  ┌───────┴────────┐      ┌────────┴─────────┐
//!  │ CommandHandler │      │  SnapshotWorker  │──> memory.dat
//!  └────────────────┘      └──────────────────┘
//! ```
//!
//! ## Expiry
//!
//! 1. **Lazy**: every read or write path checks the entry it touches
//! 2. **Sweep**: the snapshot worker removes all expired entries periodically

pub mod engine;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{Entry, StorageEngine, StorageStats, StoreError, Sweep};
pub use snapshot::{snapshot_once, SnapshotConfig, SnapshotOutcome, SnapshotWorker};
