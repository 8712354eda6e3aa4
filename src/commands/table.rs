//! Command Table
//!
//! Maps each upper-cased command name to its handler and the number of
//! arguments it accepts. Arity is checked before a handler runs, so handlers
//! index their arguments directly.

use crate::commands::handler::{
    cmd_delete, cmd_flush, cmd_get, cmd_mget, cmd_mset, cmd_set, CommandError,
};
use crate::protocol::Value;
use crate::storage::Store;

/// Signature shared by every command handler.
pub type CommandFn = fn(&Store, &[Value]) -> Result<Value, CommandError>;

/// How many arguments (excluding the command name) a command takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Any even count: key/value pairs
    Pairs,
}

impl Arity {
    pub fn accepts(self, args: usize) -> bool {
        match self {
            Arity::Exact(n) => args == n,
            Arity::AtLeast(n) => args >= n,
            Arity::Pairs => args % 2 == 0,
        }
    }
}

/// One entry of the command table.
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub handler: CommandFn,
}

/// Every built-in command.
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "GET",
        arity: Arity::Exact(1),
        handler: cmd_get,
    },
    CommandSpec {
        name: "SET",
        arity: Arity::Exact(2),
        handler: cmd_set,
    },
    CommandSpec {
        name: "DELETE",
        arity: Arity::Exact(1),
        handler: cmd_delete,
    },
    CommandSpec {
        name: "FLUSH",
        arity: Arity::Exact(0),
        handler: cmd_flush,
    },
    CommandSpec {
        name: "MGET",
        arity: Arity::AtLeast(0),
        handler: cmd_mget,
    },
    CommandSpec {
        name: "MSET",
        arity: Arity::Pairs,
        handler: cmd_mset,
    },
];

/// Finds a command by its upper-cased name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}
