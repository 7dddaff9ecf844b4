//! Error types for tabconv

use thiserror::Error;

/// Core error type for database-facing operations
#[derive(Error, Debug)]
pub enum TabconvError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Column index {index} out of range ({count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("No current row")]
    NoCurrentRow,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for database-facing operations
pub type Result<T> = std::result::Result<T, TabconvError>;
