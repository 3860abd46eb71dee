//! RESP Value Model
//!
//! This module defines the values that travel over the wire between clients
//! and PulseDB, and their canonical encoding.
//!
//! ## Protocol Format
//!
//! Each value starts with a type prefix byte and every record ends in CRLF:
//! - `+` Simple String: `+OK\r\n`
//! - `-` Simple Error: `-ERR unknown command 'FOO'\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n` (empty: `$0\r\n\r\n`)
//! - `*` Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! - `_` Null: `_\r\n`
//!
//! Serialization is fallible: simple strings and errors are trimmed first and
//! must then be non-empty and free of CR/LF.

use crate::protocol::parser::CodecError;
use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
    pub const NULL: u8 = b'_';
}

/// A value in the protocol.
///
/// Used for parsed requests, replies, and the values held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Short status text. Cannot contain CR or LF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Like a simple string, but tagged as an error for the client.
    /// Format: `-<error message>\r\n`
    Error(String),

    /// 64-bit signed integers.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Length-prefixed string. May be empty and may contain CRLF.
    /// Format: `$<length>\r\n<data>\r\n`
    ///
    /// The length prefix is always recomputed from the payload when encoding.
    BulkString(Bytes),

    /// Explicit absence marker.
    /// Format: `_\r\n`
    Null,

    /// Ordered list of values, possibly empty, possibly nested.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string value.
    ///
    /// # Example
    /// ```
    /// use pulsedb::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error value.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string value.
    ///
    /// # Example
    /// ```
    /// use pulsedb::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("hello"));
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Common reply for successful writes
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Reply to PING
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the value to its wire form.
    ///
    /// Fails with [`CodecError::Framing`] if a simple string or error (at any
    /// nesting level) is empty after trimming or contains CR/LF.
    pub fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf)?;
        Ok(buf)
    }

    /// Serializes the value into an existing buffer.
    ///
    /// On error the buffer may hold a partially written value.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            RespValue::SimpleString(s) => write_simple(buf, prefix::SIMPLE_STRING, s)?,
            RespValue::Error(s) => write_simple(buf, prefix::ERROR, s)?,
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::NULL);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

/// Writes a `+`/`-` record after trimming and validating its text.
fn write_simple(buf: &mut Vec<u8>, type_prefix: u8, text: &str) -> Result<(), CodecError> {
    let text = text.trim();

    if text.contains(['\r', '\n']) {
        return Err(CodecError::Framing(format!(
            "{} cannot contain CR or LF characters",
            simple_kind(type_prefix)
        )));
    }
    if text.is_empty() {
        return Err(CodecError::Framing(format!(
            "{} cannot be empty",
            simple_kind(type_prefix)
        )));
    }

    buf.push(type_prefix);
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(CRLF);
    Ok(())
}

fn simple_kind(type_prefix: u8) -> &'static str {
    if type_prefix == prefix::ERROR {
        "simple error"
    } else {
        "simple string"
    }
}

/// Single-line, human-readable form used in logs.
impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}
