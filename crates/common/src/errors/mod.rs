//! Error types for ShelfSync services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes
//! - Transient/permanent classification for retry policies

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    NotFound,
    ShelfItemNotFound,
    SyncRunNotFound,

    // State errors (5xxx)
    InvalidTransition,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    ProviderError,
    ProviderTimeout,
    QueueError,
    CacheError,
    PublishError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::NotFound => 4001,
            ErrorCode::ShelfItemNotFound => 4002,
            ErrorCode::SyncRunNotFound => 4003,

            ErrorCode::InvalidTransition => 5001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::ProviderError => 8002,
            ErrorCode::ProviderTimeout => 8003,
            ErrorCode::QueueError => 8005,
            ErrorCode::CacheError => 8006,
            ErrorCode::PublishError => 8007,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Shelf item not found: {id}")]
    ShelfItemNotFound { id: String },

    #[error("Sync run not found: {id}")]
    SyncRunNotFound { id: String },

    // State errors
    #[error("Sync run {id} cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Catalog provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Catalog provider '{provider}' timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    #[error("Queue error: {message}")]
    QueueError { message: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Event publish error: {message}")]
    PublishError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::ShelfItemNotFound { .. } => ErrorCode::ShelfItemNotFound,
            AppError::SyncRunNotFound { .. } => ErrorCode::SyncRunNotFound,
            AppError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Provider { .. } => ErrorCode::ProviderError,
            AppError::ProviderTimeout { .. } => ErrorCode::ProviderTimeout,
            AppError::QueueError { .. } => ErrorCode::QueueError,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::PublishError { .. } => ErrorCode::PublishError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::ProviderTimeout { .. }
            | AppError::DatabaseConnection { .. }
            | AppError::QueueError { .. }
            | AppError::CacheError { .. }
            | AppError::PublishError { .. } => true,
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::SyncRunNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::SyncRunNotFound);
        assert_eq!(err.code().as_code(), 4003);
    }

    #[test]
    fn test_provider_errors_are_classified() {
        let err = AppError::Provider {
            provider: "fixture".into(),
            message: "boom".into(),
        };
        assert!(!err.is_transient());

        let timeout = AppError::ProviderTimeout {
            provider: "http".into(),
            timeout_ms: 1500,
        };
        assert_eq!(timeout.code(), ErrorCode::ProviderTimeout);
        assert!(timeout.is_transient());
    }

    #[test]
    fn test_transition_message_is_readable() {
        let err = AppError::InvalidTransition {
            id: "r1".into(),
            from: "succeeded".into(),
            to: "running".into(),
        };
        assert_eq!(err.to_string(), "Sync run r1 cannot move from succeeded to running");
        assert!(!err.is_transient());
    }
}
