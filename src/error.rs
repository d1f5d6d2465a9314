//! Error types for sqlrow.

use thiserror::Error;

use crate::clause::Clause;

/// The main error type for sqlrow operations.
#[derive(Debug, Error)]
pub enum SqlRowError {
    /// The scanner produced an illegal token.
    #[error("Lexical error at offset {offset}: unexpected {fragment:?}")]
    Lexical { offset: usize, fragment: String },

    /// A placeholder sits where the enclosing clause cannot host it, or
    /// the insert columns and values disagree.
    #[error("Clause error in {clause}: {message}")]
    Clause { clause: Clause, message: String },

    /// Malformed `{...}` directive.
    #[error("Invalid placeholder {{{directive}}}: {message}")]
    Directive { directive: String, message: String },

    /// The record type cannot satisfy the request (missing or ambiguous
    /// primary key, bad tag, unknown field).
    #[error("Schema error in {record}: {message}")]
    Schema { record: String, message: String },

    /// A value does not have the shape the column model expects.
    #[error("Type shape error: {0}")]
    TypeShape(String),

    /// Wrong number of caller-supplied arguments.
    #[error("Expected {expected} argument(s), got {actual}")]
    Arguments { expected: usize, actual: usize },

    /// JSON cell encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqlRowError {
    /// Create a lexical error for an illegal fragment.
    pub fn lexical(offset: usize, fragment: impl Into<String>) -> Self {
        Self::Lexical {
            offset,
            fragment: fragment.into(),
        }
    }

    /// Create a clause-resolution error.
    pub fn clause(clause: Clause, message: impl Into<String>) -> Self {
        Self::Clause {
            clause,
            message: message.into(),
        }
    }

    /// Create a directive error.
    pub fn directive(directive: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Directive {
            directive: directive.into(),
            message: message.into(),
        }
    }

    /// Create a schema error for a record type.
    pub fn schema(record: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            record: record.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for sqlrow operations.
pub type SqlRowResult<T> = Result<T, SqlRowError>;
