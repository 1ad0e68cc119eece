//! Error types for the catalog.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open catalog: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} already exists")]
    Duplicate(String),
}
