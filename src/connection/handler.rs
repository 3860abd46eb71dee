//! Connection Handler Module
//!
//! This module handles individual client connections to PulseDB.
//! Each client gets its own handler task that runs in a loop,
//! reading requests and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse every complete    │ │
//!    │  │ request in the buffer   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute, queue replies  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Flush replies           │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects: `+DISCONNECTED` notice, handler task ends
//! ```
//!
//! ## Errors
//!
//! Malformed input and failed commands are answered with `-ERR <message>` and
//! the connection stays open. After malformed input the rest of the buffer is
//! discarded, since there is no reliable way to find the next frame.

use crate::commands::CommandHandler;
use crate::protocol::{RespParser, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer (8 MB). Must exceed the largest bulk
/// string the parser accepts.
const MAX_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Sent in place of a reply that failed to encode
const UNENCODABLE_REPLY: &[u8] = b"-ERR reply could not be encoded\r\n";

/// Final notice written when the client closes the connection
const DISCONNECT_NOTICE: &[u8] = b"+DISCONNECTED\r\n";

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests answered
    pub commands_processed: AtomicU64,
    /// Requests answered with an error
    pub commands_failed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_failed(&self) {
        self.commands_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// This struct manages the read buffer, parsing, and reply sending
/// for one connected client.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// RESP parser
    parser: RespParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing requests
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Returns `Ok(())` when the client closes the connection cleanly.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let answered = self.process_buffer().await?;
            if answered > 0 {
                self.stream.flush().await?;
            }

            if !self.read_more_data().await? {
                self.send_disconnect_notice().await;
                return Ok(());
            }
        }
    }

    /// Answers every complete request in the buffer. Returns how many replies
    /// were queued.
    async fn process_buffer(&mut self) -> Result<usize, ConnectionError> {
        let mut answered = 0;

        loop {
            match self.parser.parse(&self.buffer) {
                Ok(Some((request, consumed))) => {
                    let _ = self.buffer.split_to(consumed);
                    trace!(
                        client = %self.addr,
                        request = %request,
                        consumed = consumed,
                        remaining = self.buffer.len(),
                        "Parsed request"
                    );

                    let reply = self.execute(request).await;
                    self.write_reply(&reply).await?;
                    answered += 1;
                }
                Ok(None) => {
                    if !self.buffer.is_empty() {
                        trace!(
                            client = %self.addr,
                            buffered = self.buffer.len(),
                            "Incomplete request, need more data"
                        );
                    }
                    return Ok(answered);
                }
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "Malformed request");
                    self.buffer.clear();
                    self.stats.command_failed();
                    self.write_reply(&RespValue::error(format!("ERR {}", e)))
                        .await?;
                    return Ok(answered + 1);
                }
            }
        }
    }

    /// Executes one request and turns failures into error replies.
    async fn execute(&mut self, request: RespValue) -> RespValue {
        self.stats.command_processed();

        match self.command_handler.handle(request).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(client = %self.addr, error = %e, "Command failed");
                self.stats.command_failed();
                RespValue::error(format!("ERR {}", e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Returns `false` when the client closed the connection between requests.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Ok(false);
            }
            // Partial request in buffer
            return Err(ConnectionError::UnexpectedEof);
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Queues a reply on the write buffer.
    async fn write_reply(&mut self, reply: &RespValue) -> Result<(), ConnectionError> {
        let bytes = match reply.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Reply could not be encoded");
                UNENCODABLE_REPLY.to_vec()
            }
        };

        self.stream.write_all(&bytes).await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Queued reply");
        Ok(())
    }

    /// Best effort: the peer may already be gone.
    async fn send_disconnect_notice(&mut self) {
        if self.stream.write_all(DISCONNECT_NOTICE).await.is_ok()
            && self.stream.flush().await.is_ok()
        {
            self.stats.bytes_written(DISCONNECT_NOTICE.len());
        }
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
