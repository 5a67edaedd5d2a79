//! TP-003: Error taxonomy for graph construction, lowering, and emission.
//!
//! Reference, cycle, and schema errors come from user input. Invariant
//! errors mean a pass met IR it was never taught to handle.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An expression names a node, attribute, or variable that does not exist.
    #[error("{node}: property '{property}': unknown reference '{reference}'")]
    Reference {
        node: String,
        property: String,
        reference: String,
    },

    /// The node graph contains a cycle. Members are listed in traversal order.
    #[error("dependency cycle detected involving: {}", members.join(", "))]
    Cycle { members: Vec<String> },

    /// A resource kind is unknown to the provider-info source.
    #[error("{node}: unknown resource type '{type_name}' for provider '{provider}'")]
    Schema {
        node: String,
        provider: String,
        type_name: String,
    },

    /// A raw expression could not be parsed.
    #[error("{node}: property '{property}': {message}")]
    Expression {
        node: String,
        property: String,
        message: String,
    },

    /// Module-level configuration problem (duplicates, bad meta-properties, comments).
    #[error("module '{module}': {message}")]
    Config { module: String, message: String },

    /// Paths that cannot be expressed relative to one another.
    #[error("path error: {0}")]
    Path(String),

    /// Unparseable or unsupported target version.
    #[error("invalid target version '{version}': {message}")]
    Version { version: String, message: String },

    /// IR drifted from what a pass understands. Never caused by user input.
    #[error("internal error: {0}")]
    Invariant(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(module: &str, message: impl Into<String>) -> Self {
        Self::Config {
            module: module.to_string(),
            message: message.into(),
        }
    }

    /// True for errors that can only come from a builder/visitor mismatch.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}
