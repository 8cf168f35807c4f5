//! Error types for sensey-client.

/// Result type for sensey-client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur in sensey-client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// IO error, typically from the queue journal.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network-level failure talking to the collector.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector refused the reading.
    #[error("Collector rejected reading with status {status}")]
    Rejected { status: u16 },

    /// The queue journal could not be replayed.
    #[error("Corrupt queue journal: {0}")]
    CorruptJournal(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A sensor failed to produce a sample.
    #[error("Sensor error: {0}")]
    Sensor(String),
}
