//! Framed Byte Stream
//!
//! Wraps a connection and turns it into a sequence of [`Value`]s. Both the
//! server's connection handler and the client use it.
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol: a read can return half a frame, or several frames
//! at once. Incoming bytes accumulate in a `BytesMut` buffer until the parser
//! reports a complete frame; whatever follows the frame stays buffered for the
//! next call.
//!
//! End of input is classified by what is buffered at that moment:
//! - nothing buffered: the peer went away cleanly ([`StreamError::Disconnect`])
//! - a partial frame: the frame can never complete ([`StreamError::Truncated`])
//!
//! The parser resumes the partial frame on every read instead of starting
//! over, so a frame costs time linear in its size however it is split.

use crate::protocol::parser::{ParseError, RespParser, MAX_BULK_SIZE};
use crate::protocol::types::{EncodeError, Value};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::trace;

/// Largest buffered frame accepted before reading stops
pub const MAX_FRAME_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Errors produced while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Peer closed the stream with no partial frame pending
    #[error("peer disconnected")]
    Disconnect,

    /// Stream closed in the middle of a frame
    #[error("stream closed mid-frame ({buffered} bytes buffered)")]
    Truncated { buffered: usize },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A byte stream that reads and writes whole frames.
#[derive(Debug)]
pub struct FramedStream<S> {
    stream: BufWriter<S>,
    buffer: BytesMut,
    parser: RespParser,
    max_frame_size: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_size(stream, MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(stream: S, max_frame_size: usize) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            max_frame_size,
        }
    }

    /// Reads exactly one value from the stream.
    ///
    /// Bytes after the frame remain buffered, so pipelined requests come back
    /// one per call in arrival order.
    pub async fn read_value(&mut self) -> Result<Value, StreamError> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((value, consumed)) = self.parser.resume(&self.buffer)? {
                    let _ = self.buffer.split_to(consumed);
                    trace!(
                        consumed = consumed,
                        remaining = self.buffer.len(),
                        "Decoded frame"
                    );
                    return Ok(value);
                }
            }

            if self.buffer.len() >= self.max_frame_size {
                return Err(StreamError::FrameTooLarge {
                    max: self.max_frame_size,
                });
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(if self.buffer.is_empty() {
                    StreamError::Disconnect
                } else {
                    StreamError::Truncated {
                        buffered: self.buffer.len(),
                    }
                });
            }
            trace!(bytes = n, "Read data");
        }
    }

    /// Encodes `value` and writes it with a single flush.
    ///
    /// Nothing is written if the value cannot be encoded. Returns the number
    /// of bytes sent.
    pub async fn write_value(&mut self, value: &Value) -> Result<usize, StreamError> {
        let bytes = value.serialize()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(bytes = bytes.len(), "Wrote frame");
        Ok(bytes.len())
    }

    /// Number of bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_empty_stream_is_disconnect() {
        let mut framed = FramedStream::new(Builder::new().build());
        let err = framed.read_value().await.unwrap_err();
        assert!(matches!(err, StreamError::Disconnect));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_truncated() {
        let mock = Builder::new().read(b"$5\r\nhel").build();
        let mut framed = FramedStream::new(mock);
        let err = framed.read_value().await.unwrap_err();
        assert!(matches!(err, StreamError::Truncated { buffered: 7 }));
    }

    #[tokio::test]
    async fn test_eof_after_tag_is_truncated() {
        let mock = Builder::new().read(b"*").build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(
            framed.read_value().await,
            Err(StreamError::Truncated { buffered: 1 })
        ));
    }

    #[tokio::test]
    async fn test_unknown_tag_is_bad_request() {
        let mock = Builder::new().read(b"?what\r\n").build();
        let mut framed = FramedStream::new(mock);
        match framed.read_value().await {
            Err(StreamError::Parse(e)) => assert_eq!(e.to_string(), "bad request"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bulk_string_consumes_exact_frame() {
        let mock = Builder::new().read(b"$11\r\nHello World\r\n:1\r\n").build();
        let mut framed = FramedStream::new(mock);

        let first = framed.read_value().await.unwrap();
        assert_eq!(first, Value::bulk_string("Hello World"));
        assert_eq!(framed.buffered(), 4);

        let second = framed.read_value().await.unwrap();
        assert_eq!(second, Value::Integer(1));
        assert!(matches!(
            framed.read_value().await,
            Err(StreamError::Disconnect)
        ));
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mock = Builder::new()
            .read(b"*2\r\n$3\r\nG")
            .read(b"ET\r\n$4\r\nna")
            .read(b"me\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let value = framed.read_value().await.unwrap();
        assert_eq!(value, Value::command(["GET", "name"]));
    }

    #[tokio::test]
    async fn test_large_array_in_many_reads() {
        let values: Vec<Value> = (0..500)
            .map(|i| Value::bulk_string(format!("value:{}", i)))
            .collect();
        let frame = Value::array(values.clone()).serialize().unwrap();

        let mut builder = Builder::new();
        for chunk in frame.chunks(7) {
            builder.read(chunk);
        }
        let mut framed = FramedStream::new(builder.build());

        assert_eq!(framed.read_value().await.unwrap(), Value::Array(values));
        assert_eq!(framed.buffered(), 0);
    }

    #[tokio::test]
    async fn test_unterminated_line_rejected_early() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let mut framed = FramedStream::new(server);

        tokio::spawn(async move {
            let chunk = vec![b'a'; 16 * 1024];
            if client.write_all(b"+").await.is_err() {
                return;
            }
            // Far more than one line may hold, and never a CRLF
            for _ in 0..64 {
                if client.write_all(&chunk).await.is_err() {
                    return;
                }
            }
        });

        match framed.read_value().await {
            Err(StreamError::Parse(ParseError::LineTooLong { .. })) => {}
            other => panic!("expected line too long, got {:?}", other),
        }
        assert!(framed.buffered() < 256 * 1024);
    }

    #[tokio::test]
    async fn test_null_bulk_string_read() {
        let mock = Builder::new().read(b"$-1\r\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_value().await.unwrap(), Value::Null);
        assert_eq!(framed.buffered(), 0);
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let mock = Builder::new().read(b"$100\r\n0123456789").build();
        let mut framed = FramedStream::with_max_frame_size(mock, 8);
        assert!(matches!(
            framed.read_value().await,
            Err(StreamError::FrameTooLarge { max: 8 })
        ));
    }

    #[tokio::test]
    async fn test_write_value_single_frame() {
        let mock = Builder::new()
            .write(b"*2\r\n$1\r\na\r\n%1\r\n:1\r\n$-1\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let value = Value::array(vec![
            Value::bulk_string(Bytes::from("a")),
            Value::map(vec![(Value::Integer(1), Value::Null)]),
        ]);
        let written = framed.write_value(&value).await.unwrap();
        assert_eq!(written, 24);
    }

    #[tokio::test]
    async fn test_write_unencodable_value_writes_nothing() {
        let mut framed = FramedStream::new(Builder::new().build());
        let value = Value::array(vec![Value::integer(1), Value::simple_string("a\nb")]);
        let err = framed.write_value(&value).await.unwrap_err();
        assert!(matches!(err, StreamError::Encode(_)));
    }

    #[tokio::test]
    async fn test_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedStream::new(client);
        let mut reader = FramedStream::new(server);

        let values = vec![
            Value::simple_string("OK"),
            Value::error("Missing command"),
            Value::integer(-7),
            Value::bulk_string(Bytes::from(vec![0u8; 300])),
            Value::Null,
            Value::map(vec![(
                Value::bulk_string("k"),
                Value::array(vec![Value::Null, Value::integer(3)]),
            )]),
        ];

        let expected = values.clone();
        let send = tokio::spawn(async move {
            for value in &values {
                writer.write_value(value).await.unwrap();
            }
        });

        for value in expected {
            assert_eq!(reader.read_value().await.unwrap(), value);
        }
        send.await.unwrap();
    }
}
