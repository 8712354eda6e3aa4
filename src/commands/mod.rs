//! Command Module
//!
//! Receives decoded requests, executes them against the store, and returns
//! either a reply value or a [`CommandError`].
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame Parser   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (handler.rs)
//! │  - Normalise    │
//! │  - Lookup       │──> COMMANDS (table.rs)
//! │  - Check arity  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Store      │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;
pub mod table;

pub use handler::{CommandError, CommandHandler};
pub use table::{Arity, CommandSpec, COMMANDS};
