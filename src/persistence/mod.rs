//! Persistence Module
//!
//! Durability comes from the append-only file alone. Writes are journaled in
//! the order they were applied, and the journal is replayed at startup before
//! the server accepts connections.
//!
//! ```text
//!  CommandHandler ──record──> [bounded queue] ──batch/interval──> commands.aof
//!                                                                     │
//!  startup: recover() <───────────────────────────────────────────────┘
//! ```

pub mod aof;

pub use aof::{recover, AofConfig, AofError, AofSender, AofWriter, OverflowPolicy};
