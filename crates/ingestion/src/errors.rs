//! Ingestion service error types

use shelfsync_common::errors::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Invalid shelf export: {0}")]
    InvalidInput(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e.code() {
            ErrorCode::ValidationError
            | ErrorCode::InvalidFormat
            | ErrorCode::SerializationError => IngestionError::InvalidInput(e.to_string()),
            ErrorCode::QueueError => IngestionError::QueueError(e.to_string()),
            ErrorCode::ConfigurationError => IngestionError::ConfigError(e.to_string()),
            _ => IngestionError::DatabaseError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for IngestionError {
    fn from(e: serde_json::Error) -> Self {
        IngestionError::InvalidInput(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_errors_keep_their_kind() {
        let err: IngestionError = AppError::QueueError {
            message: "throttled".to_string(),
        }
        .into();
        assert!(matches!(err, IngestionError::QueueError(_)));
    }

    #[test]
    fn test_bad_json_is_invalid_input() {
        let err: IngestionError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert!(matches!(err, IngestionError::InvalidInput(_)));
    }
}
