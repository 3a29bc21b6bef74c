//! Database layer for ShelfSync
//!
//! Provides:
//! - SeaORM entity models
//! - Schema bootstrap (tables + natural-key indexes)
//! - Connection-generic upserts for the match/availability store
//! - Repository pattern for data access
//! - Connection pool management

pub mod models;
mod repository;
pub mod schema;
pub mod upsert;

pub use repository::{NotificationPage, Repository};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let primary = Self::connect(config, &config.url)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to primary: {}", e),
            })?;

        // Connect to replica if configured
        let replica = if let Some(ref read_url) = config.read_url {
            info!("Connecting to read replica...");

            let replica_conn = Self::connect(config, read_url)
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Failed to connect to replica: {}", e),
                })?;

            Some(replica_conn)
        } else {
            None
        };

        let pool = Self { primary, replica };

        if config.auto_migrate {
            schema::create_schema(pool.write()).await?;
            info!("Database schema ensured");
        }

        info!("Database connections established");

        Ok(pool)
    }

    async fn connect(
        config: &DatabaseConfig,
        url: &str,
    ) -> std::result::Result<DatabaseConnection, sea_orm::DbErr> {
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(true);

        Database::connect(opts).await
    }

    /// Single-connection SQLite database with the schema applied.
    ///
    /// Every connection to `sqlite::memory:` is a separate database, so the
    /// pool is pinned to one connection.
    pub async fn connect_in_memory() -> Result<Self> {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let primary = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        schema::create_schema(&primary).await?;

        Ok(Self { primary, replica: None })
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Same pool with reads routed to the primary, for callers that must
    /// see their own writes
    pub fn primary_only(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            replica: None,
        }
    }

    /// Start a transaction on the primary
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        self.primary.begin().await.map_err(Into::into)
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.replica {
            replica
                .execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SyncRunKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_primary_only_ignores_lagging_replica() {
        let primary = DbPool::connect_in_memory().await.unwrap();
        let lagging = DbPool::connect_in_memory().await.unwrap();
        let pool = DbPool {
            primary: primary.primary.clone(),
            replica: Some(lagging.primary.clone()),
        };

        let run = Repository::new(primary)
            .create_sync_run(Uuid::new_v4(), SyncRunKind::AvailabilityRefresh)
            .await
            .unwrap();

        assert!(Repository::new(pool.clone()).find_sync_run(run.id).await.unwrap().is_none());
        assert!(Repository::new(pool.primary_only())
            .find_sync_run(run.id)
            .await
            .unwrap()
            .is_some());
    }
}
