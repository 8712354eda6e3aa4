//! Client
//!
//! The counterpart of the server: sends one command array, reads exactly one
//! reply, and turns error replies into [`ClientError::Command`].
//!
//! ## Example
//!
//! ```ignore
//! use minikv::Client;
//!
//! let mut client = Client::connect("127.0.0.1:31337").await?;
//! client.set("name", "Ariz").await?;
//! let value = client.get("name").await?;
//! ```

use crate::protocol::{EncodeError, FramedStream, ParseError, StreamError, Value};
use bytes::Bytes;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server replied with an error value
    #[error("{0}")]
    Command(String),

    #[error("server closed the connection")]
    Disconnected,

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(Value),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StreamError> for ClientError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Disconnect => ClientError::Disconnected,
            StreamError::Parse(e) => ClientError::Protocol(e),
            StreamError::Encode(e) => ClientError::Encode(e),
            StreamError::Io(e) => ClientError::Io(e),
            err @ (StreamError::Truncated { .. } | StreamError::FrameTooLarge { .. }) => {
                ClientError::Protocol(ParseError::ProtocolError(err.to_string()))
            }
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// A connection to a server.
pub struct Client {
    framed: FramedStream<TcpStream>,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            framed: FramedStream::new(stream),
        })
    }

    /// Sends `args` as one command array and returns the reply.
    pub async fn execute(&mut self, args: Vec<Value>) -> ClientResult<Value> {
        trace!(args = args.len(), "Sending command");

        self.framed.write_value(&Value::Array(args)).await?;
        match self.framed.read_value().await? {
            Value::Error(message) => Err(ClientError::Command(message)),
            reply => Ok(reply),
        }
    }

    pub async fn get(&mut self, key: impl Into<Bytes>) -> ClientResult<Value> {
        self.execute(vec![command("GET"), Value::bulk_string(key)]).await
    }

    pub async fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> ClientResult<i64> {
        let reply = self
            .execute(vec![command("SET"), Value::bulk_string(key), Value::bulk_string(value)])
            .await?;
        expect_integer(reply)
    }

    /// Returns whether the key existed.
    pub async fn delete(&mut self, key: impl Into<Bytes>) -> ClientResult<bool> {
        let reply = self
            .execute(vec![command("DELETE"), Value::bulk_string(key)])
            .await?;
        Ok(expect_integer(reply)? == 1)
    }

    /// Returns how many keys were removed.
    pub async fn flush(&mut self) -> ClientResult<i64> {
        let reply = self.execute(vec![command("FLUSH")]).await?;
        expect_integer(reply)
    }

    pub async fn mget<K>(&mut self, keys: impl IntoIterator<Item = K>) -> ClientResult<Vec<Value>>
    where
        K: Into<Bytes>,
    {
        let mut args = vec![command("MGET")];
        args.extend(keys.into_iter().map(Value::bulk_string));

        match self.execute(args).await? {
            Value::Array(values) => Ok(values),
            other => Err(ClientError::UnexpectedResponse(other)),
        }
    }

    /// Returns the number of pairs written.
    pub async fn mset<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) -> ClientResult<i64>
    where
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        let mut args = vec![command("MSET")];
        for (key, value) in pairs {
            args.push(Value::bulk_string(key));
            args.push(Value::bulk_string(value));
        }
        let reply = self.execute(args).await?;
        expect_integer(reply)
    }
}

fn command(name: &'static str) -> Value {
    Value::bulk_string(name)
}

fn expect_integer(reply: Value) -> ClientResult<i64> {
    match reply {
        Value::Integer(n) => Ok(n),
        other => Err(ClientError::UnexpectedResponse(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{Server, ServerConfig};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn start_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let server = Server::new(ServerConfig::new("127.0.0.1", 0, 8));
            server.serve(listener, std::future::pending()).await;
        });

        addr
    }

    #[tokio::test]
    async fn test_set_get() {
        let addr = start_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        assert_eq!(client.set("k", "v").await.unwrap(), 1);
        assert_eq!(client.get("k").await.unwrap(), Value::bulk_string("v"));
        assert_eq!(client.get("missing").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_delete() {
        let addr = start_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        client.set("k", "v").await.unwrap();
        assert!(client.delete("k").await.unwrap());
        assert!(!client.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_flush() {
        let addr = start_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        client.set("key1", "value1").await.unwrap();
        client.set("key2", "value2").await.unwrap();
        assert_eq!(client.flush().await.unwrap(), 2);
        assert_eq!(client.get("key1").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_mset_mget() {
        let addr = start_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        assert_eq!(client.mset([("a", "1"), ("b", "2")]).await.unwrap(), 2);
        let values = client.mget(["a", "b", "c"]).await.unwrap();
        assert_eq!(
            values,
            vec![Value::bulk_string("1"), Value::bulk_string("2"), Value::Null]
        );
    }

    #[tokio::test]
    async fn test_binary_values() {
        let addr = start_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        let payload = Bytes::from_static(b"\x00\r\n\xffbinary");
        client.set("bin", payload.clone()).await.unwrap();
        assert_eq!(client.get("bin").await.unwrap(), Value::BulkString(payload));
    }

    #[tokio::test]
    async fn test_error_reply_is_raised() {
        let addr = start_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        let err = client
            .execute(vec![Value::bulk_string("INVALID")])
            .await
            .unwrap_err();
        match err {
            ClientError::Command(message) => {
                assert_eq!(message, "Unrecognized command: INVALID")
            }
            other => panic!("expected command error, got {:?}", other),
        }

        // The connection survives the error
        assert_eq!(client.flush().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_odd_mset_is_raised() {
        let addr = start_server().await;
        let mut client = Client::connect(addr).await.unwrap();

        let err = client
            .execute(Value::command(["MSET", "x", "1", "y"]).into_array().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Command(ref m) if m.contains("MSET")));
        assert_eq!(client.get("x").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_server_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = Client::connect(addr).await.unwrap();
        // Give the peer time to close
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let result = client.flush().await;
        assert!(matches!(
            result,
            Err(ClientError::Disconnected) | Err(ClientError::Io(_))
        ));
    }
}
