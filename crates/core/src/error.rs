//! Error types for the candle-replay system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the candle-replay system.
///
/// Fill rejections and session exhaustion are not errors; the market reports
/// them as outcomes the caller branches on.
#[derive(Error, Debug)]
pub enum Error {
    /// Historical source unreachable, non-2xx, or malformed.
    #[error("Initialization failure: {0}")]
    Initialization(String),

    /// Operation attempted before initialization.
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Malformed tick, request or result record.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data error (invalid or missing data).
    #[error("Data error: {0}")]
    Data(String),

    /// Ledger persistence error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an initialization error.
    pub fn initialization(msg: impl Into<String>) -> Self {
        Error::Initialization(msg.into())
    }

    /// Create a not-initialized error.
    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Error::NotInitialized(msg.into())
    }

    /// Create an invalid record error.
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Error::InvalidRecord(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::initialization("HTTP 500");
        assert_eq!(err.to_string(), "Initialization failure: HTTP 500");

        let err = Error::invalid_record("price is zero");
        assert_eq!(err.to_string(), "Invalid record: price is zero");
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
