//! Command Handler Module
//!
//! Dispatches parsed requests to the store and journals successful writes.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection, replies `PONG`
//! - `ECHO message` - Echo message
//! - `SET key value [EX seconds | PX milliseconds | PXAT unix-ms]` - Set a key
//! - `GET key` - Get a key's value
//! - `DEL key` - Delete a key
//! - `INCR key` - Increment an integer value
//!
//! A request that is not an array is echoed back unchanged, except for Null,
//! which is rejected.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  dispatch() │───>│  execute()  │───>│  journal    │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                            │                  │             │
//! │                            ▼                  ▼             │
//! │                     StorageEngine         AofSender         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::command::{Command, CommandError};
use crate::persistence::AofSender;
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::trace;

/// A request after validation.
enum Request {
    /// Non-array primitives are answered with themselves
    Passthrough(RespValue),
    Command(Command),
}

/// Handles requests by dispatching them to the store.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Journal for successful writes; absent during recovery and in tests
    aof: Option<AofSender>,
    /// Held from applying a write until its record is queued, so the journal
    /// order matches the order writes hit the store
    journal_order: Arc<Mutex<()>>,
}

impl CommandHandler {
    /// Creates a handler that does not journal.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            aof: None,
            journal_order: Arc::new(Mutex::new(())),
        }
    }

    /// Journals every successful SET, DEL, and INCR to `aof`.
    pub fn with_aof(mut self, aof: AofSender) -> Self {
        self.aof = Some(aof);
        self
    }

    /// Returns the storage engine behind this handler.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a request without journaling it.
    ///
    /// This is the path AOF replay uses.
    pub fn execute(&self, request: RespValue) -> Result<RespValue, CommandError> {
        match Self::dispatch(request)? {
            Request::Passthrough(value) => Ok(value),
            Request::Command(command) => command.execute(&self.storage),
        }
    }

    /// Executes a request and, if it changed the store, queues its record on
    /// the AOF.
    ///
    /// Under the `block` overflow policy this waits for queue space.
    pub async fn handle(&self, request: RespValue) -> Result<RespValue, CommandError> {
        let command = match Self::dispatch(request)? {
            Request::Passthrough(value) => return Ok(value),
            Request::Command(command) => command,
        };

        let aof = match &self.aof {
            Some(aof) if command.is_write() => aof,
            _ => return command.execute(&self.storage),
        };

        let _order = self.journal_order.lock().await;
        let reply = command.execute(&self.storage)?;
        if let Some(record) = command.to_record() {
            aof.append(&record).await;
        }

        Ok(reply)
    }

    /// Validates a request into a command.
    fn dispatch(request: RespValue) -> Result<Request, CommandError> {
        let parts = match request {
            RespValue::Array(parts) => parts,
            RespValue::Null => return Err(CommandError::NotACommand("null request")),
            other => return Ok(Request::Passthrough(other)),
        };

        let command = Command::from_parts(parts, SystemTime::now())?;
        trace!(command = command.name(), "Dispatching command");
        Ok(Request::Command(command))
    }
}
