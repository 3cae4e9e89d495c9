//! Store error types.

use thiserror::Error;

/// Errors raised by the durable stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store is unavailable (used by fail injection in tests).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
