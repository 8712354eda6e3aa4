//! # minikv - A Small Networked Key-Value Store
//!
//! minikv keeps one in-memory map of byte-string keys and serves it over TCP
//! using a RESP-style wire protocol. Every connection shares the same store.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                              minikv                               │
//! │                                                                   │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────┐           │
//! │  │   Server    │───>│  Connection  │───>│  Command    │           │
//! │  │ (Semaphore) │    │   Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬───────┘    └──────┬──────┘           │
//! │                            │                   │                  │
//! │                            ▼                   ▼                  │
//! │                     ┌──────────────┐    ┌─────────────┐           │
//! │                     │ FramedStream │    │   Store     │           │
//! │                     │ (RespParser) │    │ Mutex<Map>  │           │
//! │                     └──────────────┘    └─────────────┘           │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use minikv::{Client, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::new(ServerConfig::default());
//!     tokio::spawn(async move { server.run(std::future::pending()).await });
//!
//!     let mut client = Client::connect("127.0.0.1:31337").await?;
//!     client.set("name", "Ariz").await?;
//!     println!("{}", client.get("name").await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `GET key`
//! - `SET key value`
//! - `DELETE key`
//! - `FLUSH`
//! - `MGET key [key ...]`
//! - `MSET key value [key value ...]`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Wire values, the incremental decoder and framed streams
//! - [`storage`]: The shared key-value store
//! - [`commands`]: Command table and dispatch
//! - [`connection`]: Per-client session loop
//! - [`server`]: Listener and connection limit
//! - [`client`]: Async client

pub mod client;
pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{Client, ClientError};
pub use commands::{CommandError, CommandHandler};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{FramedStream, ParseError, RespParser, Value};
pub use server::{Server, ServerConfig};
pub use storage::Store;

/// The default port minikv listens on
pub const DEFAULT_PORT: u16 = 31337;

/// The default host minikv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Connections served at once unless configured otherwise
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Version of minikv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
