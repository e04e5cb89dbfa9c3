//! Engine error types.

use thiserror::Error;

/// Errors surfaced by the storage, index, join, and lock components.
#[derive(Error, Debug)]
pub enum DbError {
    /// Primary key or unique column conflict.
    #[error("constraint violation on '{table}.{column}': value {value} conflicts with an existing row")]
    ConstraintViolation {
        table: String,
        column: String,
        value: String,
    },

    /// Column arity or type error, including failed casts.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The table is exclusively locked by another process.
    #[error("table '{table}' is locked by process {owner_pid}")]
    Locked { table: String, owner_pid: u32 },

    /// Index-nested-loop join requested with no matching index.
    #[error("index-nested-loop join cannot run: {0}")]
    IndexUnavailable(String),

    /// The requested join strategy cannot serve the given condition.
    #[error("unsupported join mode: {0}")]
    UnsupportedJoinMode(String),

    /// A condition references an unknown column or an uncomparable pairing.
    #[error("malformed condition: {0}")]
    MalformedCondition(String),

    /// Column not found in table
    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Table not found
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Table already exists
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Index not found
    #[error("index '{0}' not found")]
    IndexNotFound(String),

    /// Index name or indexed column already taken
    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    /// I/O error during persistence
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Artifact failed magic, version, or checksum validation
    #[error("data corruption detected: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
