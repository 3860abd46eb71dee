//! # PulseDB - An In-Memory Key-Value Server
//!
//! PulseDB is a small Redis-style key-value server written in Rust. Clients
//! speak a subset of RESP over TCP; values live in memory with optional expiry
//! and survive restarts through an append-only file.
//!
//! ## Features
//!
//! - **RESP Codec**: Cursor-based parser with depth and size limits
//! - **TTL Support**: Lazy expiry on access plus a periodic sweep
//! - **Durability**: Writes are journaled to an AOF and replayed at startup
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              PulseDB                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │──> AofSender ─┐  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │               │  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘               │  │
//! │                                               │                      ▼  │
//! │  ┌─────────────┐    ┌─────────────────────────▼──────┐    ┌──────────┐  │
//! │  │   RESP      │    │         StorageEngine          │    │AofWriter │  │
//! │  │   Parser    │    │  RwLock<HashMap<String,Entry>> │    └────┬─────┘  │
//! │  └─────────────┘    └─────────────────────────▲──────┘         │        │
//! │                                               │          commands.aof   │
//! │                     ┌─────────────────────────┴───────┐                 │
//! │                     │  SnapshotWorker (sweep)         │──> memory.dat   │
//! │                     └─────────────────────────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use pulsedb::commands::CommandHandler;
//! use pulsedb::connection::{handle_connection, ConnectionStats};
//! use pulsedb::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `SET key value [EX seconds | PX milliseconds | PXAT unix-ms]`
//! - `GET key`
//! - `DEL key`
//! - `INCR key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value model, parser, and serializer
//! - [`storage`]: Thread-safe storage engine with TTL, plus the sweep worker
//! - [`commands`]: Command validation and dispatch
//! - [`persistence`]: Append-only file writer and recovery
//! - [`connection`]: Client connection management
//! - [`config`]: Command-line and environment configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{AofWriter, OverflowPolicy};
pub use protocol::{CodecError, RespParser, RespValue};
pub use storage::{SnapshotWorker, StorageEngine};

/// The default port PulseDB listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host PulseDB binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of PulseDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
