//! Wire Protocol
//!
//! A binary-safe, type-tagged protocol modeled on RESP.
//!
//! ## Overview
//!
//! Every frame starts with a one-byte tag (`+ - : $ * %`). Metadata lines end
//! in CRLF, bulk strings are length-prefixed, and arrays and maps nest freely.
//! The same codec is used by the server and the client.
//!
//! ## Modules
//!
//! - `types`: The `Value` enum and its encoder
//! - `parser`: Recursive-descent decoder over a byte buffer
//! - `stream`: `FramedStream`, one value per read over an async byte stream
//!
//! ## Example
//!
//! ```
//! use minikv::protocol::{parse_message, Value};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let response = Value::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize().unwrap(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod stream;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use stream::{FramedStream, StreamError};
pub use types::{EncodeError, Value};
