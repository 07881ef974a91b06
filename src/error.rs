//! Error types for sync store operations.

use thiserror::Error;

/// Errors that can occur while reading or writing the sync store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Schema migrations could not be applied. Fatal at startup.
    #[error("migration failed: {0}")]
    Migration(String),

    /// A value does not fit the fixed-width text encoding.
    #[error("encode overflow: {0}")]
    EncodeOverflow(String),

    /// A stored row violates a uniqueness or referential invariant.
    #[error("store corrupt: {0}")]
    Corrupt(String),

    /// The underlying engine rejected or aborted a statement.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A JSON-encoded column could not be read or written.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sync store operations.
pub type StoreResult<T> = Result<T, StoreError>;
