//! Cursor-Based RESP Parser
//!
//! This module turns wire bytes back into [`RespValue`]s. It is a recursive-descent
//! parser over a byte slice: every routine returns the parsed value together with
//! the number of bytes it consumed, so the caller always knows where the next
//! value begins.
//!
//! ## Entry Points
//!
//! - [`RespParser::parse`] is incremental. It returns:
//!   - `Ok(Some((value, consumed)))` - a complete value was parsed
//!   - `Ok(None)` - the buffer holds only part of a value, read more
//!   - `Err(CodecError)` - the bytes can never form a valid value
//! - [`deserialize`] is strict. The input must be exactly one complete value:
//!   empty input or input without a trailing CRLF is a framing error, and both
//!   missing and leftover bytes are a length mismatch.
//!
//! Bulk string payloads are taken by their declared length, so payloads may
//! contain CRLF themselves.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Malformed CRLF framing, or a simple string that cannot be framed
    #[error("framing error: {0}")]
    Framing(String),

    /// A number was required but the payload is not one
    #[error("parse error: {0}")]
    Parse(String),

    /// The leading byte is not a known type prefix
    #[error("unknown type prefix: {0:#04x}")]
    UnknownType(u8),

    /// Declared and actual length (or element count) disagree
    #[error("length mismatch: {0}")]
    LengthMismatch(String),

    /// Arrays nested deeper than the parser allows
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// A bulk string declares more bytes than the parser accepts
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, CodecError>;

/// Maximum size for a single bulk string (4 MB)
pub const MAX_BULK_SIZE: usize = 4 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Upper bound on the element capacity reserved up front for an array header.
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

/// A RESP parser.
///
/// The parser itself holds no buffered data; it only carries its limits.
///
/// # Example
///
/// ```
/// use pulsedb::protocol::parser::RespParser;
///
/// let parser = RespParser::new();
/// let (value, consumed) = parser
///     .parse(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(consumed, 23);
/// assert_eq!(value.as_array().map(|a| a.len()), Some(2));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RespParser {
    max_depth: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a parser with the default nesting limit.
    pub fn new() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Creates a parser that rejects arrays nested deeper than `max_depth`.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Attempts to parse one value from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.parse_value(buf, 0)
    }

    fn parse_value(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if depth > self.max_depth {
            return Err(CodecError::NestingTooDeep(self.max_depth));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => parse_simple(buf, RespValue::SimpleString),
            prefix::ERROR => parse_simple(buf, RespValue::Error),
            prefix::INTEGER => parse_integer(buf),
            prefix::BULK_STRING => parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf, depth),
            prefix::NULL => parse_null(buf),
            other => Err(CodecError::UnknownType(other)),
        }
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&self, buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
        let (header, mut consumed) = match header_line(buf) {
            Some(line) => line,
            None => return Ok(None),
        };

        let count = parse_length(header, "array length")?;

        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }
        if count < 0 {
            return Err(CodecError::Parse(format!("invalid array length: {}", count)));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));

        for _ in 0..count {
            match self.parse_value(&buf[consumed..], depth + 1)? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Parses `+<text>\r\n` or `-<text>\r\n`.
fn parse_simple(
    buf: &[u8],
    build: fn(String) -> RespValue,
) -> ParseResult<Option<(RespValue, usize)>> {
    match header_line(buf) {
        Some((content, consumed)) => {
            let s = utf8(content)?;
            Ok(Some((build(s.to_string()), consumed)))
        }
        None => Ok(None),
    }
}

/// Parses an integer: `:<integer>\r\n`
fn parse_integer(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    match header_line(buf) {
        Some((content, consumed)) => {
            let s = utf8(content)?;
            let n: i64 = s
                .parse()
                .map_err(|_| CodecError::Parse(format!("invalid integer: {:?}", s)))?;
            Ok(Some((RespValue::Integer(n), consumed)))
        }
        None => Ok(None),
    }
}

/// Parses a bulk string: `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let (header, data_start) = match header_line(buf) {
        Some(line) => line,
        None => return Ok(None),
    };

    let length = parse_length(header, "bulk string length")?;

    if length == -1 {
        return Ok(Some((RespValue::Null, data_start)));
    }
    if length < 0 {
        return Err(CodecError::Parse(format!(
            "invalid bulk string length: {}",
            length
        )));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(CodecError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let data_end = data_start + length;
    let total = data_end + CRLF.len();
    if buf.len() < total {
        return Ok(None);
    }

    if &buf[data_end..total] != CRLF {
        return Err(CodecError::LengthMismatch(format!(
            "bulk string payload is not {} bytes long",
            length
        )));
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
    Ok(Some((RespValue::BulkString(data), total)))
}

/// Parses a null: `_\r\n`
fn parse_null(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    match header_line(buf) {
        Some((content, consumed)) if content.is_empty() => Ok(Some((RespValue::Null, consumed))),
        Some(_) => Err(CodecError::Parse("null carries a payload".to_string())),
        None => Ok(None),
    }
}

/// Splits the first record of `buf` into its content (without the prefix byte)
/// and the number of bytes the record occupies including CRLF.
fn header_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    find_crlf(&buf[1..]).map(|pos| (&buf[1..1 + pos], 1 + pos + CRLF.len()))
}

fn parse_length(content: &[u8], what: &str) -> ParseResult<i64> {
    let s = utf8(content)?;
    s.parse()
        .map_err(|_| CodecError::Parse(format!("invalid {}: {:?}", what, s)))
}

fn utf8(content: &[u8]) -> ParseResult<&str> {
    std::str::from_utf8(content).map_err(|e| CodecError::Parse(format!("invalid UTF-8: {}", e)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

/// Decodes exactly one value from `input`.
///
/// # Example
///
/// ```
/// use pulsedb::protocol::{deserialize, RespValue};
///
/// let value = deserialize(b":42\r\n").unwrap();
/// assert_eq!(value, RespValue::Integer(42));
/// ```
pub fn deserialize(input: &[u8]) -> ParseResult<RespValue> {
    if input.is_empty() {
        return Err(CodecError::Framing("empty input".to_string()));
    }
    if !input.ends_with(CRLF) {
        return Err(CodecError::Framing("input does not end with CRLF".to_string()));
    }

    match RespParser::new().parse(input)? {
        Some((value, consumed)) if consumed == input.len() => Ok(value),
        Some((_, consumed)) => Err(CodecError::LengthMismatch(format!(
            "{} unconsumed bytes after the value",
            input.len() - consumed
        ))),
        None => Err(CodecError::LengthMismatch(
            "input ended before the declared length was reached".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        RespParser::new().parse(buf)
    }

    #[test]
    fn test_parse_simple_string() {
        let result = parse_message(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(result.0, RespValue::SimpleString("OK".to_string()));
        assert_eq!(result.1, 5);
    }

    #[test]
    fn test_parse_simple_string_incomplete() {
        assert!(parse_message(b"+OK").unwrap().is_none());
    }

    #[test]
    fn test_parse_error() {
        let input = b"-ERR unknown command\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(
            result.0,
            RespValue::Error("ERR unknown command".to_string())
        );
        assert_eq!(result.1, 22);
    }

    #[test]
    fn test_parse_integer() {
        let result = parse_message(b":1000\r\n").unwrap().unwrap();
        assert_eq!(result.0, RespValue::Integer(1000));
        assert_eq!(result.1, 7);

        let result = parse_message(b":-42\r\n").unwrap().unwrap();
        assert_eq!(result.0, RespValue::Integer(-42));
    }

    #[test]
    fn test_parse_invalid_integer() {
        let result = parse_message(b":not_a_number\r\n");
        assert!(matches!(result, Err(CodecError::Parse(_))));
    }

    #[test]
    fn test_parse_bulk_string() {
        let result = parse_message(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(result.0, RespValue::BulkString(Bytes::from("hello")));
        assert_eq!(result.1, 11);
    }

    #[test]
    fn test_parse_bulk_string_with_embedded_crlf() {
        let result = parse_message(b"$7\r\nab\r\ncde\r\n").unwrap().unwrap();
        assert_eq!(result.0, RespValue::BulkString(Bytes::from("ab\r\ncde")));
        assert_eq!(result.1, 13);
    }

    #[test]
    fn test_parse_empty_bulk_string() {
        let result = parse_message(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(result.0, RespValue::BulkString(Bytes::new()));
        assert_eq!(result.1, 6);
    }

    #[test]
    fn test_parse_bulk_string_incomplete() {
        assert!(parse_message(b"$5\r\nhel").unwrap().is_none());
    }

    #[test]
    fn test_parse_bulk_string_length_mismatch() {
        let result = parse_message(b"$3\r\nhello\r\n");
        assert!(matches!(result, Err(CodecError::LengthMismatch(_))));
    }

    #[test]
    fn test_parse_bulk_string_too_large() {
        let input = format!("${}\r\n", MAX_BULK_SIZE + 1);
        let result = parse_message(input.as_bytes());
        assert!(matches!(result, Err(CodecError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_parse_nulls() {
        assert_eq!(parse_message(b"_\r\n").unwrap().unwrap(), (RespValue::Null, 3));
        assert_eq!(parse_message(b"$-1\r\n").unwrap().unwrap(), (RespValue::Null, 5));
        assert_eq!(parse_message(b"*-1\r\n").unwrap().unwrap(), (RespValue::Null, 5));
        assert!(matches!(
            parse_message(b"_x\r\n"),
            Err(CodecError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_array() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(
            result.0,
            RespValue::Array(vec![
                RespValue::BulkString(Bytes::from("GET")),
                RespValue::BulkString(Bytes::from("name")),
            ])
        );
        assert_eq!(result.1, 23);
    }

    #[test]
    fn test_parse_empty_array() {
        let result = parse_message(b"*0\r\n").unwrap().unwrap();
        assert_eq!(result, (RespValue::Array(vec![]), 4));
    }

    #[test]
    fn test_parse_nested_array() {
        let input = b"*3\r\n*2\r\n:2\r\n:3\r\n*0\r\n+end\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(
            result.0,
            RespValue::Array(vec![
                RespValue::Array(vec![RespValue::Integer(2), RespValue::Integer(3)]),
                RespValue::Array(vec![]),
                RespValue::SimpleString("end".to_string()),
            ])
        );
        assert_eq!(result.1, input.len());
    }

    #[test]
    fn test_parse_array_incomplete() {
        assert!(parse_message(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
    }

    #[test]
    fn test_parse_invalid_array_length() {
        assert!(matches!(
            parse_message(b"*-3\r\n"),
            Err(CodecError::Parse(_))
        ));
        assert!(matches!(
            parse_message(b"*x\r\n"),
            Err(CodecError::Parse(_))
        ));
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let parser = RespParser::with_max_depth(2);
        assert!(parser.parse(b"*1\r\n*1\r\n*0\r\n").unwrap().is_some());
        assert_eq!(
            parser.parse(b"*1\r\n*1\r\n*1\r\n*0\r\n"),
            Err(CodecError::NestingTooDeep(2))
        );

        let deep = "*1\r\n".repeat(MAX_NESTING_DEPTH + 2);
        assert!(matches!(
            parse_message(deep.as_bytes()),
            Err(CodecError::NestingTooDeep(_))
        ));
    }

    #[test]
    fn test_unknown_prefix() {
        assert_eq!(
            parse_message(b"@invalid\r\n"),
            Err(CodecError::UnknownType(b'@'))
        );
    }

    #[test]
    fn test_deserialize_framing() {
        assert!(matches!(deserialize(b""), Err(CodecError::Framing(_))));
        assert!(matches!(deserialize(b"+hello"), Err(CodecError::Framing(_))));
    }

    #[test]
    fn test_deserialize_rejects_leftover_input() {
        let result = deserialize(b"*1\r\n$4\r\nPING\r\n$4\r\nPING\r\n");
        assert!(matches!(result, Err(CodecError::LengthMismatch(_))));
    }

    #[test]
    fn test_deserialize_rejects_missing_elements() {
        let result = deserialize(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n");
        assert!(matches!(result, Err(CodecError::LengthMismatch(_))));
    }

    #[test]
    fn test_deserialize_bulk_shorter_than_declared() {
        let result = deserialize(b"$10\r\nhello\r\n");
        assert!(matches!(result, Err(CodecError::LengthMismatch(_))));
    }

    #[test]
    fn test_deserialize_set_command() {
        let input = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$4\r\nAriz\r\n";
        assert_eq!(
            deserialize(input).unwrap(),
            RespValue::Array(vec![
                RespValue::BulkString(Bytes::from("SET")),
                RespValue::BulkString(Bytes::from("user:101")),
                RespValue::BulkString(Bytes::from("Ariz")),
            ])
        );
    }

    #[test]
    fn test_roundtrip() {
        let values = vec![
            RespValue::simple_string("OK"),
            RespValue::error("ERR boom"),
            RespValue::integer(i64::MIN),
            RespValue::bulk_string(Bytes::new()),
            RespValue::bulk_string(Bytes::from("multi\r\nline")),
            RespValue::null(),
            RespValue::array(vec![]),
            RespValue::array(vec![
                RespValue::array(vec![RespValue::integer(1), RespValue::null()]),
                RespValue::bulk_string(Bytes::from("SET")),
                RespValue::simple_string("nested"),
            ]),
        ];

        for original in values {
            let serialized = original.serialize().unwrap();
            assert_eq!(deserialize(&serialized).unwrap(), original);
        }
    }
}
