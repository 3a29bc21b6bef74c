//! Sync worker error types

use shelfsync_common::errors::{AppError, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync run not found: {0}")]
    RunNotFound(String),

    #[error("Catalog provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid sync run state: {0}")]
    InvalidState(String),

    /// Another worker holds the run and has reported within its lease
    #[error("Sync run {0} is still running elsewhere")]
    RunInProgress(String),

    #[error("Sync run timed out after {0}s")]
    Timeout(u64),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl From<AppError> for SyncError {
    fn from(e: AppError) -> Self {
        if let AppError::SyncRunNotFound { id } = e {
            return SyncError::RunNotFound(id);
        }

        match e.code() {
            ErrorCode::ProviderError | ErrorCode::ProviderTimeout | ErrorCode::UpstreamError => {
                SyncError::Provider(e.to_string())
            }
            ErrorCode::DatabaseError | ErrorCode::ConnectionError => {
                SyncError::Database(e.to_string())
            }
            ErrorCode::InvalidTransition => SyncError::InvalidState(e.to_string()),
            ErrorCode::QueueError => SyncError::Queue(e.to_string()),
            ErrorCode::ConfigurationError => SyncError::Config(e.to_string()),
            _ => SyncError::Internal(e.to_string()),
        }
    }
}

impl From<sea_orm::DbErr> for SyncError {
    fn from(e: sea_orm::DbErr) -> Self {
        SyncError::Database(e.to_string())
    }
}
