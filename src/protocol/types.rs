//! Wire Value Model
//!
//! This module defines every value that can travel over the wire, together
//! with its encoder. Each value starts with a one-byte type tag:
//!
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String (or `$-1` for null)
//! - `*` Array
//! - `%` Map
//!
//! Metadata lines are terminated with CRLF (`\r\n`); bulk payloads are
//! length-prefixed and binary-safe.
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-Unrecognized command: FOO\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null: `$-1\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Map: `%1\r\n+key\r\n:1\r\n`

use crate::protocol::parser::MAX_LINE_LENGTH;
use bytes::Bytes;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// The CRLF terminator used by every metadata line
pub const CRLF: &[u8] = b"\r\n";

/// Type tag bytes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
    pub const MAP: u8 = b'%';
}

/// Raised when a value has no valid wire representation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The value would not decode back: a line payload with CR or LF or
    /// longer than a line, or a map with a repeated key
    #[error("unrecognized type: {0}")]
    UnrecognizedType(&'static str),
}

/// A single protocol-level value.
///
/// The same type is used for requests, responses and stored payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Short line-oriented text. Never contains CR or LF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Failure message, distinguished from `SimpleString` only by its tag.
    /// Format: `-<message>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe byte payload.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// The null bulk string.
    /// Format: `$-1\r\n`
    Null,

    /// Ordered sequence of any values, including nested arrays and maps.
    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<Value>),

    /// Key/value pairs in the order they were written. Keys must be
    /// distinct, or the map cannot be encoded.
    /// Format: `%<pairs>\r\n<key1><value1>...`
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Creates a new simple string value.
    ///
    /// # Example
    /// ```
    /// use minikv::protocol::types::Value;
    /// let ok = Value::simple_string("OK");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        Value::SimpleString(s.into())
    }

    /// Creates a new error value.
    pub fn error(s: impl Into<String>) -> Self {
        Value::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Value::Integer(n)
    }

    /// Creates a new bulk string value.
    ///
    /// # Example
    /// ```
    /// use minikv::protocol::types::Value;
    /// use bytes::Bytes;
    /// let bulk = Value::bulk_string(Bytes::from("hello"));
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Value::BulkString(data.into())
    }

    pub fn null() -> Self {
        Value::Null
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(values)
    }

    pub fn map(pairs: Vec<(Value, Value)>) -> Self {
        Value::Map(pairs)
    }

    /// Builds a command request: an array of bulk-string tokens.
    ///
    /// # Example
    /// ```
    /// use minikv::protocol::types::Value;
    /// let request = Value::command(["SET", "name", "Ariz"]);
    /// assert_eq!(request.serialize().unwrap(), b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n");
    /// ```
    pub fn command<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Value::Array(tokens.into_iter().map(Value::bulk_string).collect())
    }

    /// Encodes the value to its wire format.
    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf)?;
        Ok(buf)
    }

    /// Encodes the value into an existing buffer.
    ///
    /// On error the buffer may hold a partial frame; callers must discard it.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            Value::SimpleString(s) => {
                write_line(buf, prefix::SIMPLE_STRING, s)?;
            }
            Value::Error(s) => {
                write_line(buf, prefix::ERROR, s)?;
            }
            Value::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Value::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Value::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Value::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf)?;
                }
            }
            Value::Map(pairs) => {
                let mut seen = HashSet::with_capacity(pairs.len());
                if !pairs.iter().all(|(key, _)| seen.insert(key)) {
                    return Err(EncodeError::UnrecognizedType("map with duplicate keys"));
                }
                buf.push(prefix::MAP);
                buf.extend_from_slice(pairs.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for (key, value) in pairs {
                    key.serialize_into(buf)?;
                    value.serialize_into(buf)?;
                }
            }
        }
        Ok(())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::SimpleString(s) => Some(s),
            Value::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner bytes from SimpleString or BulkString.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::SimpleString(s) => Some(s.as_bytes()),
            Value::BulkString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

fn write_line(buf: &mut Vec<u8>, tag: u8, text: &str) -> Result<(), EncodeError> {
    let (with_crlf, too_long) = match tag {
        prefix::ERROR => (
            "error message containing CR or LF",
            "error message longer than a line",
        ),
        _ => (
            "simple string containing CR or LF",
            "simple string longer than a line",
        ),
    };
    if text.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(EncodeError::UnrecognizedType(with_crlf));
    }
    if text.len() > MAX_LINE_LENGTH {
        return Err(EncodeError::UnrecognizedType(too_long));
    }
    buf.push(tag);
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(CRLF);
    Ok(())
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::BulkString(data)
    }
}

impl From<Option<Bytes>> for Value {
    fn from(data: Option<Bytes>) -> Self {
        data.map_or(Value::Null, Value::BulkString)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::SimpleString(s) => write!(f, "\"{}\"", s),
            Value::Error(s) => write!(f, "(error) {}", s),
            Value::Integer(n) => write!(f, "(integer) {}", n),
            Value::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            Value::Null => write!(f, "(nil)"),
            Value::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                        }
                        write!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
            Value::Map(pairs) => {
                if pairs.is_empty() {
                    write!(f, "(empty map)")
                } else {
                    for (i, (k, v)) in pairs.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                        }
                        write!(f, "{}# {} => {}", i + 1, k, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
