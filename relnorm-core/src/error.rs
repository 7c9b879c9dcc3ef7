//! Error types for the decomposition core.
//!
//! Expected domain outcomes (missing coverage, an empty undo stack, a
//! duplicate column drop) are modeled as result enums on the operations
//! themselves. `CoreError` is reserved for contract violations: mutating a
//! locked group, referencing a dead table id, annotating a table with a
//! mis-shaped RIC matrix.

use thiserror::Error;

/// Errors raised by the decomposition model.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A mutation was attempted while the decomposition is locked.
    #[error("decomposition is locked: {0}")]
    Locked(String),

    /// A table id did not resolve to a live table.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A table definition contained the same global column twice.
    #[error("duplicate column {column} in table definition")]
    DuplicateColumn { column: usize },

    /// A RIC matrix did not match the shape of the table it annotates.
    #[error(
        "RIC matrix is {actual_rows}x{actual_cols}, table needs {expected_rows}x{expected_cols}"
    )]
    RicShape {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Create a locked-mutation error.
    pub fn locked(msg: impl Into<String>) -> Self {
        CoreError::Locked(msg.into())
    }

    /// Create an unknown-table error.
    pub fn unknown_table(id: impl std::fmt::Display) -> Self {
        CoreError::UnknownTable(id.to_string())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        CoreError::Other(msg.into())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
