//! Command Handler Module
//!
//! Turns a decoded request into tokens, looks the command up in the
//! [`COMMANDS`](crate::commands::table::COMMANDS) table and runs it against
//! the store.
//!
//! ## Supported Commands
//!
//! - `GET key` - value, or null if absent
//! - `SET key value` - unconditional upsert, replies `1`
//! - `DELETE key` - `1` if removed, `0` if absent
//! - `FLUSH` - removes everything, replies with the count removed
//! - `MGET key [key ...]` - values or nulls, in request order
//! - `MSET key value [key value ...]` - replies with the number of pairs written
//!
//! ## Request Forms
//!
//! A request is normally an array of bulk strings whose first element is the
//! command name (case-insensitive). A bare simple or bulk string is accepted
//! too and split on whitespace.
//!
//! Failures are returned as [`CommandError`]; turning them into error replies
//! is the connection's job.

use crate::commands::table::{self, COMMANDS};
use crate::protocol::{EncodeError, Value};
use crate::storage::Store;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A semantic failure of one request. Never fatal to the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Missing command")]
    MissingCommand,

    #[error("Unrecognized command: {0}")]
    Unrecognized(String),

    #[error("Request must be list or simple string.")]
    InvalidRequest,

    #[error("invalid command name")]
    InvalidCommandName,

    #[error("invalid key for '{0}' command")]
    InvalidKey(&'static str),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// A reply could not be encoded
    #[error("unrecognized type: {0}")]
    UnrecognizedType(&'static str),
}

impl From<EncodeError> for CommandError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::UnrecognizedType(kind) => CommandError::UnrecognizedType(kind),
        }
    }
}

/// Dispatches requests to the command table.
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Names of every supported command, in table order.
    pub fn command_names() -> impl Iterator<Item = &'static str> {
        COMMANDS.iter().map(|spec| spec.name)
    }

    /// Executes one request and returns the reply value.
    pub fn execute(&self, request: Value) -> Result<Value, CommandError> {
        let tokens = match request {
            Value::Array(tokens) => tokens,
            Value::SimpleString(line) => tokenize(line.as_bytes()),
            Value::BulkString(line) => tokenize(&line),
            _ => return Err(CommandError::InvalidRequest),
        };

        let (name, args) = tokens.split_first().ok_or(CommandError::MissingCommand)?;
        let name = command_name(name)?;

        let spec = table::lookup(&name).ok_or(CommandError::Unrecognized(name))?;
        if !spec.arity.accepts(args.len()) {
            return Err(CommandError::WrongArity(spec.name));
        }

        debug!(command = spec.name, args = args.len(), "Received command");
        (spec.handler)(&self.store, args)
    }
}

/// Splits an inline request line on ASCII whitespace.
fn tokenize(line: &[u8]) -> Vec<Value> {
    line.split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| Value::BulkString(Bytes::copy_from_slice(token)))
        .collect()
}

/// Extracts and upper-cases the command name token.
fn command_name(token: &Value) -> Result<String, CommandError> {
    let name = match token {
        Value::SimpleString(s) => s.as_str(),
        Value::BulkString(b) => {
            std::str::from_utf8(b).map_err(|_| CommandError::InvalidCommandName)?
        }
        _ => return Err(CommandError::InvalidCommandName),
    };
    // Error replies echo the name on one line
    if name.contains(|c: char| c == '\r' || c == '\n') {
        return Err(CommandError::InvalidCommandName);
    }
    Ok(name.to_ascii_uppercase())
}

/// Extracts a key; bulk and simple strings with the same bytes are the same key.
fn key(value: &Value, command: &'static str) -> Result<Bytes, CommandError> {
    match value {
        Value::BulkString(b) => Ok(b.clone()),
        Value::SimpleString(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        _ => Err(CommandError::InvalidKey(command)),
    }
}

// ============================================================================
// Commands
// ============================================================================

/// GET key
pub(crate) fn cmd_get(store: &Store, args: &[Value]) -> Result<Value, CommandError> {
    let key = key(&args[0], "GET")?;
    Ok(store.get(&key).unwrap_or(Value::Null))
}

/// SET key value
pub(crate) fn cmd_set(store: &Store, args: &[Value]) -> Result<Value, CommandError> {
    let key = key(&args[0], "SET")?;
    store.set(key, args[1].clone());
    Ok(Value::integer(1))
}

/// DELETE key
pub(crate) fn cmd_delete(store: &Store, args: &[Value]) -> Result<Value, CommandError> {
    let key = key(&args[0], "DELETE")?;
    Ok(Value::integer(store.delete(&key) as i64))
}

/// FLUSH
pub(crate) fn cmd_flush(store: &Store, _args: &[Value]) -> Result<Value, CommandError> {
    Ok(Value::integer(store.flush() as i64))
}

/// MGET key [key ...]
pub(crate) fn cmd_mget(store: &Store, args: &[Value]) -> Result<Value, CommandError> {
    let keys = args
        .iter()
        .map(|arg| key(arg, "MGET"))
        .collect::<Result<Vec<_>, _>>()?;

    let values = store
        .get_many(&keys)
        .into_iter()
        .map(|value| value.unwrap_or(Value::Null))
        .collect();

    Ok(Value::array(values))
}

/// MSET key value [key value ...]
///
/// An odd argument count never reaches here; the table rejects it.
pub(crate) fn cmd_mset(store: &Store, args: &[Value]) -> Result<Value, CommandError> {
    // Validate every key before writing anything
    let pairs = args
        .chunks_exact(2)
        .map(|pair| Ok((key(&pair[0], "MSET")?, pair[1].clone())))
        .collect::<Result<Vec<_>, CommandError>>()?;

    Ok(Value::integer(store.set_many(pairs) as i64))
}
