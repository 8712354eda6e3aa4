//! Storage Module
//!
//! The single in-memory mapping backing every command. It is created empty
//! when the server starts, shared by all connections through an `Arc`, and
//! dropped on exit.
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Connection 1 │  │ Connection 2 │  │ Connection N │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │                 │                 │
//!        ▼                 ▼                 ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 Store (Arc<Store>)                  │
//! │          Mutex<HashMap<Bytes, Value>>               │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod store;

pub use store::Store;
