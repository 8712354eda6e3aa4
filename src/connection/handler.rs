//! Connection Handler Module
//!
//! This module handles individual client connections. Each client gets its
//! own handler task that runs in a loop, reading requests and sending
//! responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!        ┌──────────────────────┐
//!   ┌───>│  AWAITING_REQUEST    │── Disconnect ───────────────┐
//!   │    └──────────┬───────────┘                             │
//!   │               │ one frame decoded                       │
//!   │               ▼                                         │
//!   │    ┌──────────────────────┐                             │
//!   │    │     DISPATCHING      │  CommandError → error reply │
//!   │    └──────────┬───────────┘                             │
//!   │               │                                         │
//!   │               ▼                                         ▼
//!   │    ┌──────────────────────┐                      ┌────────────┐
//!   └────│  WRITING_RESPONSE    │                      │   CLOSED   │
//!        └──────────────────────┘                      └────────────┘
//! ```
//!
//! A bad command never kills the connection. A malformed frame does: the
//! peer gets one error reply, then the connection closes because the byte
//! stream can no longer be re-framed.

use crate::commands::{CommandError, CommandHandler};
use crate::protocol::{EncodeError, FramedStream, ParseError, StreamError, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Commands answered with an error reply
    pub command_errors: AtomicU64,
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
        self.command_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed frame; the stream cannot be re-framed
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client closed the connection between requests
    #[error("Client disconnected")]
    Disconnected,

    /// Unexpected end of stream (partial frame)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Frame size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,

    #[error("Encode error: {0}")]
    EncodeError(#[from] EncodeError),
}

impl From<StreamError> for ConnectionError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Disconnect => ConnectionError::Disconnected,
            StreamError::Truncated { .. } => ConnectionError::UnexpectedEof,
            StreamError::Parse(e) => ConnectionError::ParseError(e),
            StreamError::Encode(e) => ConnectionError::EncodeError(e),
            StreamError::FrameTooLarge { .. } => ConnectionError::BufferFull,
            StreamError::Io(e) => ConnectionError::IoError(e),
        }
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler<S> {
    framed: FramedStream<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            framed: FramedStream::new(stream),
            addr,
            command_handler,
            stats,
        }
    }

    /// Runs the request loop until the client disconnects or the stream
    /// breaks.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Connection received");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client went away"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let request = match self.framed.read_value().await {
                Ok(request) => request,
                Err(StreamError::Disconnect) => return Ok(()),
                Err(StreamError::Parse(e)) => {
                    warn!(client = %self.addr, error = %e, "Malformed request");
                    self.send_response(&Value::error(e.to_string())).await?;
                    return Err(ConnectionError::ParseError(e));
                }
                Err(err @ StreamError::FrameTooLarge { .. }) => {
                    self.send_response(&Value::error(err.to_string())).await?;
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            };

            let response = self.dispatch(request);
            self.send_response(&response).await?;
        }
    }

    /// Executes one request, converting command failures into error replies.
    fn dispatch(&self, request: Value) -> Value {
        self.stats.command_processed();
        match self.command_handler.execute(request) {
            Ok(response) => response,
            Err(e) => {
                debug!(client = %self.addr, error = %e, "Command failed");
                self.stats.command_failed();
                Value::error(e.to_string())
            }
        }
    }

    /// Sends a response to the client.
    ///
    /// A reply that cannot be encoded is replaced by an error reply.
    async fn send_response(&mut self, response: &Value) -> Result<(), ConnectionError> {
        let written = match self.framed.write_value(response).await {
            Err(StreamError::Encode(e)) => {
                let err = CommandError::from(e);
                warn!(client = %self.addr, error = %err, "Unencodable reply");
                self.stats.command_failed();
                self.framed.write_value(&Value::error(err.to_string())).await?
            }
            other => other?,
        };

        self.stats.bytes_written(written);
        trace!(client = %self.addr, bytes = written, "Sent response");
        Ok(())
    }
}

/// Handles a client connection.
///
/// Creates a [`ConnectionHandler`] and runs it to completion. Errors only
/// affect this connection, so they are logged and dropped.
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
