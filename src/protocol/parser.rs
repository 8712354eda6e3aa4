//! Streaming Frame Parser
//!
//! This module decodes one wire value from the front of a byte buffer. Values
//! are built iteratively: scalars are decoded in place, while arrays and maps
//! sit on an explicit stack until their last element arrives.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(ParseError)` - Malformed frame
//!
//! Nothing past the current frame is inspected, so trailing bytes (the next
//! pipelined request) are left for the next call. The caller appends network
//! data to the buffer until a frame completes; see [`FramedStream`].
//!
//! [`RespParser::resume`] keeps the partial frame between calls, so bytes
//! already decoded are never scanned again while the rest of a frame trickles
//! in. [`RespParser::parse`] always starts from scratch.
//!
//! ## Limits
//!
//! Declared lengths come from the peer, so they are bounded before any
//! allocation: bulk payloads by [`MAX_BULK_SIZE`], element counts by
//! [`MAX_ELEMENTS`], nesting by [`MAX_NESTING_DEPTH`] and CRLF-terminated
//! lines by [`MAX_LINE_LENGTH`].
//!
//! [`FramedStream`]: crate::protocol::FramedStream

use crate::protocol::types::{prefix, Value, CRLF};
use bytes::Bytes;
use std::collections::HashSet;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors raised by a malformed frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type tag byte
    #[error("bad request")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string, error message or length line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    #[error("invalid map length: {0}")]
    InvalidMapLength(i64),

    /// The same key appears twice in one map
    #[error("duplicate map key")]
    DuplicateMapKey,

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    #[error("too many elements: {count} (max: {max})")]
    TooManyElements { count: usize, max: usize },

    /// The bulk payload exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A simple string, error or length line ran past the limit without CRLF
    #[error("line too long (max: {max} bytes)")]
    LineTooLong { max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (64 MB)
pub const MAX_BULK_SIZE: usize = 64 * 1024 * 1024;

/// Maximum declared element count of one array, or pair count of one map
pub const MAX_ELEMENTS: usize = 1024 * 1024;

/// Maximum array/map nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a CRLF-terminated line, excluding the tag and CRLF
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Upper bound on up-front allocation for a declared element count
const PREALLOC_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Array,
    Map,
}

/// An array or map still waiting for elements.
#[derive(Debug)]
struct Pending {
    kind: Container,
    /// Element count; twice the pair count for a map
    expected: usize,
    items: Vec<Value>,
}

impl Pending {
    fn new(kind: Container, expected: usize) -> Self {
        Self {
            kind,
            expected,
            items: Vec::with_capacity(expected.min(PREALLOC_LIMIT)),
        }
    }

    fn is_complete(&self) -> bool {
        self.items.len() == self.expected
    }

    fn finish(self) -> ParseResult<Value> {
        match self.kind {
            Container::Array => Ok(Value::Array(self.items)),
            Container::Map => {
                let mut flat = self.items.into_iter();
                let mut pairs = Vec::with_capacity(self.expected / 2);
                while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                    pairs.push((key, value));
                }

                let mut seen = HashSet::with_capacity(pairs.len());
                if !pairs.iter().all(|(key, _)| seen.insert(key)) {
                    return Err(ParseError::DuplicateMapKey);
                }
                Ok(Value::Map(pairs))
            }
        }
    }
}

/// What one tag and its header line decoded to.
enum Item {
    /// A finished value and the bytes it used
    Complete(Value, usize),
    /// A container header: kind, element count and header length
    Open(Container, usize, usize),
}

/// A streaming frame parser.
///
/// # Example
///
/// ```
/// use minikv::protocol::{RespParser, Value};
///
/// let mut parser = RespParser::new();
/// let buffer = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n:1\r\n";
///
/// let (value, consumed) = parser.parse(buffer).unwrap().unwrap();
/// assert_eq!(value, Value::command(["GET", "name"]));
/// assert_eq!(&buffer[consumed..], b":1\r\n");
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Open containers, outermost first
    stack: Vec<Pending>,
    /// Offset of the first byte not yet decoded
    pos: usize,
    /// Bytes of the current line already searched for CRLF
    line_scanned: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to parse one value from the front of the buffer, discarding
    /// any partial frame from an earlier call.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        self.reset();
        self.resume(buf)
    }

    /// Continues the frame left incomplete by the previous call.
    ///
    /// `buf` must start with the same bytes as last time, usually with more
    /// appended. After a value or an error the parser is reset.
    pub fn resume(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        let result = self.drive(buf);
        if !matches!(result, Ok(None)) {
            self.reset();
        }
        result
    }

    /// Drops any partial frame.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.pos = 0;
        self.line_scanned = 0;
    }

    fn drive(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        loop {
            if self.stack.len() > MAX_NESTING_DEPTH {
                return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
            }

            let rest = buf.get(self.pos..).unwrap_or_default();
            let mut value = match self.next_item(rest)? {
                None => return Ok(None),
                Some(Item::Complete(value, used)) => {
                    self.pos += used;
                    value
                }
                Some(Item::Open(kind, count, used)) => {
                    self.pos += used;
                    let pending = Pending::new(kind, count);
                    if !pending.is_complete() {
                        self.stack.push(pending);
                        continue;
                    }
                    pending.finish()?
                }
            };

            // Hand the value to its parent, closing every container it fills
            loop {
                let Some(mut parent) = self.stack.pop() else {
                    return Ok(Some((value, self.pos)));
                };
                parent.items.push(value);
                if !parent.is_complete() {
                    self.stack.push(parent);
                    break;
                }
                value = parent.finish()?;
            }
        }
    }

    /// Decodes the tag at the front of `buf` and whatever directly follows it.
    fn next_item(&mut self, buf: &[u8]) -> ParseResult<Option<Item>> {
        let Some(&tag) = buf.first() else {
            return Ok(None);
        };

        let item = match tag {
            prefix::SIMPLE_STRING => self
                .read_text(buf)?
                .map(|(s, used)| Item::Complete(Value::SimpleString(s), used)),
            prefix::ERROR => self
                .read_text(buf)?
                .map(|(s, used)| Item::Complete(Value::Error(s), used)),
            prefix::INTEGER => self
                .read_number(buf)?
                .map(|(n, used)| Item::Complete(Value::Integer(n), used)),
            prefix::BULK_STRING => self.read_bulk_string(buf)?,
            prefix::ARRAY => match self.read_number(buf)? {
                Some((count, used)) => {
                    let count = element_count(count, ParseError::InvalidArrayLength)?;
                    Some(Item::Open(Container::Array, count, used))
                }
                None => None,
            },
            prefix::MAP => match self.read_number(buf)? {
                Some((count, used)) => {
                    let count = element_count(count, ParseError::InvalidMapLength)?;
                    Some(Item::Open(Container::Map, count * 2, used))
                }
                None => None,
            },
            other => return Err(ParseError::UnknownPrefix(other)),
        };
        Ok(item)
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn read_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<Item>> {
        let (length, header) = match self.read_number(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        // Null bulk string: no payload follows
        if length == -1 {
            return Ok(Some(Item::Complete(Value::Null, header)));
        }

        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        // Payload plus its trailing CRLF
        let total_needed = header + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..header + length]);
        Ok(Some(Item::Complete(Value::BulkString(data), total_needed)))
    }

    /// Finds the line after the tag byte. Returns the line and the bytes used
    /// including tag and CRLF.
    fn read_line<'a>(&mut self, buf: &'a [u8]) -> ParseResult<Option<(&'a [u8], usize)>> {
        let line = &buf[1..];

        // A CR may already have been seen as the last scanned byte
        let from = self.line_scanned.saturating_sub(1).min(line.len());
        match find_crlf(&line[from..]) {
            Some(offset) => {
                self.line_scanned = 0;
                let end = from + offset;
                if end > MAX_LINE_LENGTH {
                    return Err(ParseError::LineTooLong {
                        max: MAX_LINE_LENGTH,
                    });
                }
                // +1 for tag, +2 for CRLF
                Ok(Some((&line[..end], 1 + end + 2)))
            }
            None if line.len() > MAX_LINE_LENGTH + 1 => Err(ParseError::LineTooLong {
                max: MAX_LINE_LENGTH,
            }),
            None => {
                self.line_scanned = line.len();
                Ok(None)
            }
        }
    }

    /// Reads the line after the tag byte as UTF-8 text.
    fn read_text(&mut self, buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
        match self.read_line(buf)? {
            Some((line, used)) => {
                let s = std::str::from_utf8(line)
                    .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
                Ok(Some((s.to_string(), used)))
            }
            None => Ok(None),
        }
    }

    /// Reads the line after the tag byte as a signed integer.
    fn read_number(&mut self, buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
        match self.read_text(buf)? {
            Some((line, used)) => {
                let n: i64 = line.parse().map_err(|e: ParseIntError| {
                    ParseError::InvalidInteger(format!("{line:?}: {e}"))
                })?;
                Ok(Some((n, used)))
            }
            None => Ok(None),
        }
    }
}

/// Validates a declared element (or pair) count.
fn element_count(declared: i64, invalid: fn(i64) -> ParseError) -> ParseResult<usize> {
    if declared < 0 {
        return Err(invalid(declared));
    }
    let count = declared as usize;
    if count > MAX_ELEMENTS {
        return Err(ParseError::TooManyElements {
            count,
            max: MAX_ELEMENTS,
        });
    }
    Ok(count)
}

/// Returns the position of `\r` in the first CRLF, if any.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single value from bytes with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
    RespParser::new().parse(buf)
}
