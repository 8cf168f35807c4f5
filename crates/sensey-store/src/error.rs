//! Error types for sensey-store.

use std::path::PathBuf;

/// Result type for sensey-store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in sensey-store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error from MySQL.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create the data directory.
    #[error("Failed to create data directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid or incomplete backend configuration. Fatal at startup,
    /// never retried.
    #[error("Invalid storage configuration: {0}")]
    Config(String),

    /// Client id unusable as a storage key.
    #[error("Invalid client id '{0}'")]
    InvalidClientId(String),

    /// Serialization error for the flexible attribute column.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record could not be read back.
    #[error("Corrupt record in series for '{client_id}': {detail}")]
    CorruptRecord { client_id: String, detail: String },
}

impl StorageError {
    /// Whether retrying the operation could plausibly succeed.
    ///
    /// Pool exhaustion and socket-level failures are transient; config and
    /// data errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Io(_) => true,
            StorageError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}
