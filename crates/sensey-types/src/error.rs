//! Error types for payload parsing.

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors that can occur while decoding a sensor payload.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The payload was not valid JSON.
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The payload was valid JSON but not an object.
    #[error("Payload must be a JSON object, got {0}")]
    NotAnObject(String),

    /// A measurement value was not numeric.
    #[error("Field '{field}' is not a finite number")]
    NonNumericField { field: String },

    /// The timestamp could not be parsed.
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// The payload contained no measurements at all.
    #[error("Payload contains no measurement fields")]
    EmptyPayload,
}
