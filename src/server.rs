//! Server Frontend
//!
//! Accepts TCP connections and spawns one [`ConnectionHandler`] task per
//! client, with at most `max_connections` sessions alive at once.
//!
//! A semaphore permit is taken *before* `accept()`. While every permit is
//! held the loop stops accepting, so extra clients wait in the kernel's
//! accept queue rather than being rejected. A permit is returned when its
//! connection task ends, including when the task panics.
//!
//! [`ConnectionHandler`]: crate::connection::ConnectionHandler

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::Store;
use crate::{DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Server configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of concurrently served connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, max_connections: usize) -> Self {
        Self {
            host: host.into(),
            port,
            max_connections,
        }
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The key-value server: one store shared by every connection.
pub struct Server {
    config: ServerConfig,
    store: Arc<Store>,
    stats: Arc<ConnectionStats>,
    limit: Arc<Semaphore>,
}

impl Server {
    /// Creates a server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(Store::new()))
    }

    pub fn with_store(config: ServerConfig, store: Arc<Store>) -> Self {
        // A zero limit would never accept anyone
        let permits = config.max_connections.max(1);
        Self {
            config,
            store,
            stats: Arc::new(ConnectionStats::new()),
            limit: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        info!(address = %listener.local_addr()?, "Listening");
        Ok(listener)
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serves connections from `listener` until `shutdown` resolves.
    ///
    /// Connections already running are left to finish on their own.
    pub async fn serve(&self, listener: TcpListener, shutdown: impl Future<Output = ()>) {
        tokio::select! {
            _ = self.accept_loop(listener) => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
    }

    /// Main loop that accepts incoming connections
    async fn accept_loop(&self, listener: TcpListener) {
        loop {
            let permit = match Arc::clone(&self.limit).acquire_owned().await {
                Ok(permit) => permit,
                // Only happens if the semaphore is closed
                Err(_) => return,
            };

            match listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = CommandHandler::new(Arc::clone(&self.store));
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(async move {
                        handle_connection(stream, addr, handler, stats).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FramedStream, Value};
    use std::net::SocketAddr;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    type Running = (
        SocketAddr,
        Arc<Store>,
        Arc<ConnectionStats>,
        oneshot::Sender<()>,
    );

    async fn start_server(max_connections: usize) -> Running {
        let server = Server::new(ServerConfig::new("127.0.0.1", 0, max_connections));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::clone(server.store());
        let stats = Arc::clone(server.stats());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await;
        });

        (addr, store, stats, tx)
    }

    async fn connect(addr: SocketAddr) -> FramedStream<TcpStream> {
        FramedStream::new(TcpStream::connect(addr).await.unwrap())
    }

    async fn roundtrip(conn: &mut FramedStream<TcpStream>, request: Value) -> Value {
        conn.write_value(&request).await.unwrap();
        conn.read_value().await.unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:31337");
        assert_eq!(config.max_connections, 64);
    }

    #[tokio::test]
    async fn test_store_shared_across_connections() {
        let (addr, store, _, _shutdown) = start_server(4).await;

        let mut first = connect(addr).await;
        let mut second = connect(addr).await;

        let reply = roundtrip(&mut first, Value::command(["SET", "k", "v"])).await;
        assert_eq!(reply, Value::integer(1));

        let reply = roundtrip(&mut second, Value::command(["GET", "k"])).await;
        assert_eq!(reply, Value::bulk_string("v"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_limit_queues_extra_clients() {
        let (addr, _, stats, _shutdown) = start_server(1).await;

        let mut first = connect(addr).await;
        let reply = roundtrip(&mut first, Value::command(["SET", "k", "v"])).await;
        assert_eq!(reply, Value::integer(1));

        // The second client connects at the TCP level but is not served yet
        let mut second = connect(addr).await;
        second
            .write_value(&Value::command(["GET", "k"]))
            .await
            .unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(200), second.read_value()).await;
        assert!(pending.is_err());
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        // Closing the first connection frees the slot
        drop(first);
        let reply = tokio::time::timeout(Duration::from_secs(5), second.read_value())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, Value::bulk_string("v"));
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_malformed_client_does_not_affect_others() {
        let (addr, _, _, _shutdown) = start_server(4).await;

        let mut healthy = connect(addr).await;
        let mut broken = TcpStream::connect(addr).await.unwrap();

        broken.write_all(b"?garbage\r\n").await.unwrap();
        let mut buf = Vec::new();
        broken.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"-bad request\r\n");

        let reply = roundtrip(&mut healthy, Value::command(["MSET", "a", "1", "b", "2"])).await;
        assert_eq!(reply, Value::integer(2));
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let (addr, _, _, shutdown) = start_server(4).await;

        let mut conn = connect(addr).await;
        assert_eq!(
            roundtrip(&mut conn, Value::command(["FLUSH"])).await,
            Value::integer(0)
        );

        shutdown.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Listener is dropped with the accept loop
        let result = TcpStream::connect(addr).await;
        assert!(result.is_err());

        // The existing connection still works
        assert_eq!(
            roundtrip(&mut conn, Value::command(["FLUSH"])).await,
            Value::integer(0)
        );
    }
}
