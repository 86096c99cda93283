//! Error types for the persistent store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error from the SQLite driver.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes do not decode into the expected shape.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The backend failed outside of the driver (lock poisoning, task join).
    #[error("backend error: {0}")]
    Backend(String),
}
