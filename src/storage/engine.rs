//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the key-value store behind PulseDB: a `HashMap`
//! guarded by one reader-writer lock, with lazily enforced time-to-live.
//!
//! ## Lock Discipline
//!
//! ```text
//!   get     read lock ──> live?    ──> clone value, done
//!                     └─> expired? ──> release, take write lock,
//!                                      re-check, remove, KeyExpired
//!   set     write lock ──> insert/replace
//!   delete  write lock ──> exists? expired? remove        (one critical section)
//!   incr    write lock ──> exists? expired? integer? +1   (one critical section)
//!   sweep   write lock ──> drop expired, collect live entries
//! ```
//!
//! `std::sync::RwLock` cannot upgrade a read guard in place, so `get` drops
//! its read guard before taking the write guard and re-validates the entry:
//! another task may have removed or replaced it in between.
//!
//! An entry is visible only while its expiry is unset or in the future.
//! Expiry is absolute wall-clock time so that it survives an AOF replay.

use crate::protocol::RespValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;
use thiserror::Error;

/// Errors returned by store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found")]
    KeyNotFound,

    #[error("expiration time has passed")]
    KeyExpired,

    #[error("value is not an integer or out of range")]
    NotANumber,
}

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored value (an integer or a bulk string)
    pub value: RespValue,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<SystemTime>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: RespValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry that expires at `expires_at`.
    pub fn with_expiry(value: RespValue, expires_at: SystemTime) -> Self {
        Self {
            value,
            expires_at: Some(expires_at),
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    #[inline]
    fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Default)]
pub struct Sweep {
    /// Live entries, sorted by key
    pub live: Vec<(String, RespValue)>,
    /// Number of expired entries removed by this pass
    pub expired: u64,
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of keys currently stored (expired but unswept keys included)
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub incr_ops: u64,
    /// Total expired keys removed, lazily or by a sweep
    pub expired: u64,
}

/// The key-value store shared by every connection and background worker.
///
/// Wrap it in an `Arc` and hand clones to the tasks that need it.
///
/// # Example
///
/// ```
/// use pulsedb::storage::{Entry, StorageEngine, StoreError};
/// use pulsedb::protocol::RespValue;
///
/// let engine = StorageEngine::new();
///
/// engine.set("counter".to_string(), Entry::new(RespValue::integer(11)));
/// assert_eq!(engine.incr("counter"), Ok(12));
/// assert_eq!(engine.get("counter"), Ok(RespValue::integer(12)));
///
/// assert_eq!(engine.delete("counter"), Ok(()));
/// assert_eq!(engine.get("counter"), Err(StoreError::KeyNotFound));
/// ```
#[derive(Default)]
pub struct StorageEngine {
    data: RwLock<HashMap<String, Entry>>,

    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    incr_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl StorageEngine {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated:
    // every critical section mutates it with a single insert/remove/retain.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the value for a key.
    ///
    /// An expired entry is removed and reported as [`StoreError::KeyExpired`]
    /// once; afterwards the key is simply not found.
    pub fn get(&self, key: &str) -> Result<RespValue, StoreError> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        {
            let data = self.read();
            match data.get(key) {
                None => return Err(StoreError::KeyNotFound),
                Some(entry) if !entry.is_expired() => return Ok(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut data = self.write();
        match data.get(key) {
            None => Err(StoreError::KeyNotFound),
            // Replaced by a concurrent SET while no lock was held
            Some(entry) if !entry.is_expired() => Ok(entry.value.clone()),
            Some(_) => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                Err(StoreError::KeyExpired)
            }
        }
    }

    /// Inserts or replaces an entry, together with its expiry.
    pub fn set(&self, key: String, entry: Entry) {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.write().insert(key, entry);
    }

    /// Removes a key.
    ///
    /// A stale entry is removed too, but reported as [`StoreError::KeyExpired`].
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write();
        match data.remove(key) {
            None => Err(StoreError::KeyNotFound),
            Some(entry) if entry.is_expired() => {
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                Err(StoreError::KeyExpired)
            }
            Some(_) => Ok(()),
        }
    }

    /// Increments an integer value by 1 and returns the new value.
    ///
    /// The key keeps its expiry.
    pub fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.incr_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write();
        let entry = data.get_mut(key).ok_or(StoreError::KeyNotFound)?;

        if entry.is_expired() {
            data.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::KeyExpired);
        }

        let current = entry.value.as_integer().ok_or(StoreError::NotANumber)?;
        let next = current.checked_add(1).ok_or(StoreError::NotANumber)?;
        entry.value = RespValue::Integer(next);

        Ok(next)
    }

    /// Removes every expired entry and returns clones of the live ones.
    ///
    /// Runs under a single write lock, so the returned view is consistent.
    pub fn sweep(&self) -> Sweep {
        let now = SystemTime::now();
        let mut data = self.write();

        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        let expired = (before - data.len()) as u64;

        let mut live: Vec<(String, RespValue)> = data
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();
        drop(data);

        live.sort_by(|a, b| a.0.cmp(&b.0));

        if expired > 0 {
            self.expired_count.fetch_add(expired, Ordering::Relaxed);
        }

        Sweep { live, expired }
    }

    /// Returns the number of stored keys, including expired keys that have not
    /// been removed yet.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns operation counters.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            incr_ops: self.incr_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
