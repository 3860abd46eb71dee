//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol that
//! PulseDB speaks: simple strings, simple errors, integers, bulk strings,
//! arrays, and null.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and its canonical serialization
//! - `parser`: Cursor-based parser for incoming RESP data
//!
//! ## Example
//!
//! ```
//! use pulsedb::protocol::{deserialize, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing one complete frame
//! let command = deserialize(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
//! assert_eq!(command.as_array().map(|items| items.len()), Some(2));
//!
//! // Encoding a reply
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.serialize().unwrap(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{deserialize, CodecError, ParseResult, RespParser};
pub use types::RespValue;
