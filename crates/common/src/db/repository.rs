//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::catalog::Format;
use crate::db::models::*;
use crate::db::upsert::{self, ImportSummary, ShelfEntry};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One page of a user's notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPage {
    pub total: u64,
    pub items: Vec<NotificationEvent>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Start a transaction on the primary
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        self.pool.begin().await
    }

    // ========================================================================
    // Shelf Operations
    // ========================================================================

    /// Apply a normalized shelf export in one transaction
    pub async fn import_shelf_items(
        &self,
        user_id: Uuid,
        source_id: Option<Uuid>,
        entries: &[ShelfEntry],
    ) -> Result<ImportSummary> {
        let txn = self.write_conn().begin().await?;
        let summary = upsert::upsert_shelf_items(&txn, user_id, source_id, entries).await?;
        txn.commit().await?;
        Ok(summary)
    }

    /// All shelf items of a user in processing order
    pub async fn list_shelf_items(&self, user_id: Uuid) -> Result<Vec<ShelfItem>> {
        ShelfItemEntity::find()
            .filter(ShelfItemColumn::UserId.eq(user_id))
            .order_by_asc(ShelfItemColumn::CreatedAt)
            .order_by_asc(ShelfItemColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Count shelf items of a user
    pub async fn count_shelf_items(&self, user_id: Uuid) -> Result<u64> {
        ShelfItemEntity::find()
            .filter(ShelfItemColumn::UserId.eq(user_id))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Match Operations
    // ========================================================================

    /// All matches of a user
    pub async fn list_matches(&self, user_id: Uuid) -> Result<Vec<CatalogMatch>> {
        CatalogMatchEntity::find()
            .filter(CatalogMatchColumn::UserId.eq(user_id))
            .order_by_asc(CatalogMatchColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Availability Operations
    // ========================================================================

    /// Snapshots of a user, optionally narrowed to one catalog item
    pub async fn list_snapshots(
        &self,
        user_id: Uuid,
        catalog_item_id: Option<Uuid>,
    ) -> Result<Vec<AvailabilitySnapshot>> {
        let mut query = AvailabilitySnapshotEntity::find()
            .filter(AvailabilitySnapshotColumn::UserId.eq(user_id));
        if let Some(item) = catalog_item_id {
            query = query.filter(AvailabilitySnapshotColumn::CatalogItemId.eq(item));
        }

        query
            .order_by_asc(AvailabilitySnapshotColumn::CatalogItemId)
            .order_by_asc(AvailabilitySnapshotColumn::Format)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Sync Run Operations
    // ========================================================================

    /// Create a queued sync run
    pub async fn create_sync_run(&self, user_id: Uuid, kind: SyncRunKind) -> Result<SyncRun> {
        let now = chrono::Utc::now();

        let run = SyncRunActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            kind: Set(kind.as_str().to_string()),
            status: Set(SyncRunStatus::Queued.into()),
            progress_current: Set(0),
            progress_total: Set(0),
            error_message: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        run.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find sync run by ID
    pub async fn find_sync_run(&self, id: Uuid) -> Result<Option<SyncRun>> {
        SyncRunEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Most recently created run of a user
    pub async fn latest_sync_run_for_user(&self, user_id: Uuid) -> Result<Option<SyncRun>> {
        SyncRunEntity::find()
            .filter(SyncRunColumn::UserId.eq(user_id))
            .order_by_desc(SyncRunColumn::CreatedAt)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn load_sync_run(&self, id: Uuid) -> Result<SyncRun> {
        SyncRunEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::SyncRunNotFound { id: id.to_string() })
    }

    /// Explain a rejected transition
    async fn transition_error(&self, id: Uuid, to: SyncRunStatus) -> AppError {
        match self.load_sync_run(id).await {
            Ok(run) => AppError::InvalidTransition {
                id: id.to_string(),
                from: run.status,
                to: to.to_string(),
            },
            Err(e) => e,
        }
    }

    /// queued -> running, recording the amount of work
    pub async fn mark_sync_run_running(&self, id: Uuid, progress_total: i32) -> Result<SyncRun> {
        let now = DateTimeWithTimeZone::from(chrono::Utc::now());

        let result = SyncRunEntity::update_many()
            .col_expr(
                SyncRunColumn::Status,
                Expr::value(String::from(SyncRunStatus::Running)),
            )
            .col_expr(SyncRunColumn::ProgressTotal, Expr::value(progress_total))
            .col_expr(SyncRunColumn::ProgressCurrent, Expr::value(0))
            .col_expr(SyncRunColumn::StartedAt, Expr::value(Some(now)))
            .col_expr(SyncRunColumn::UpdatedAt, Expr::value(now))
            .filter(SyncRunColumn::Id.eq(id))
            .filter(SyncRunColumn::Status.eq(SyncRunStatus::Queued.as_str()))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected != 1 {
            return Err(self.transition_error(id, SyncRunStatus::Running).await);
        }

        self.load_sync_run(id).await
    }

    /// Persist progress of a running run
    pub async fn update_sync_run_progress(&self, id: Uuid, progress_current: i32) -> Result<()> {
        let now = DateTimeWithTimeZone::from(chrono::Utc::now());

        let result = SyncRunEntity::update_many()
            .col_expr(SyncRunColumn::ProgressCurrent, Expr::value(progress_current))
            .col_expr(SyncRunColumn::UpdatedAt, Expr::value(now))
            .filter(SyncRunColumn::Id.eq(id))
            .filter(SyncRunColumn::Status.eq(SyncRunStatus::Running.as_str()))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected != 1 {
            return Err(self.transition_error(id, SyncRunStatus::Running).await);
        }

        Ok(())
    }

    /// running -> succeeded
    pub async fn mark_sync_run_succeeded(&self, id: Uuid) -> Result<SyncRun> {
        self.finish_sync_run(id, SyncRunStatus::Succeeded, None, &[SyncRunStatus::Running])
            .await
    }

    /// queued | running -> failed
    pub async fn mark_sync_run_failed(&self, id: Uuid, message: &str) -> Result<SyncRun> {
        self.finish_sync_run(
            id,
            SyncRunStatus::Failed,
            Some(message.to_string()),
            &[SyncRunStatus::Queued, SyncRunStatus::Running],
        )
        .await
    }

    async fn finish_sync_run(
        &self,
        id: Uuid,
        to: SyncRunStatus,
        error_message: Option<String>,
        from: &[SyncRunStatus],
    ) -> Result<SyncRun> {
        let now = DateTimeWithTimeZone::from(chrono::Utc::now());

        let result = SyncRunEntity::update_many()
            .col_expr(SyncRunColumn::Status, Expr::value(String::from(to)))
            .col_expr(SyncRunColumn::ErrorMessage, Expr::value(error_message))
            .col_expr(SyncRunColumn::FinishedAt, Expr::value(Some(now)))
            .col_expr(SyncRunColumn::UpdatedAt, Expr::value(now))
            .filter(SyncRunColumn::Id.eq(id))
            .filter(SyncRunColumn::Status.is_in(from.iter().map(|s| s.as_str())))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected != 1 {
            return Err(self.transition_error(id, to).await);
        }

        self.load_sync_run(id).await
    }

    // ========================================================================
    // Settings Operations
    // ========================================================================

    /// Settings row of a user, if any
    pub async fn find_user_settings(&self, user_id: Uuid) -> Result<Option<UserSettings>> {
        UserSettingsEntity::find_by_id(user_id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Create or replace the settings of a user
    pub async fn upsert_user_settings(
        &self,
        user_id: Uuid,
        library_system: Option<String>,
        preferred_formats: &[Format],
        notifications_enabled: bool,
    ) -> Result<UserSettings> {
        let now = chrono::Utc::now();
        let formats = serde_json::to_value(preferred_formats)?;

        match UserSettingsEntity::find_by_id(user_id).one(self.write_conn()).await? {
            Some(existing) => {
                let mut settings: UserSettingsActiveModel = existing.into();
                settings.library_system = Set(library_system);
                settings.preferred_formats = Set(formats);
                settings.notifications_enabled = Set(notifications_enabled);
                settings.updated_at = Set(now.into());
                settings.update(self.write_conn()).await.map_err(Into::into)
            }
            None => UserSettingsActiveModel {
                user_id: Set(user_id),
                library_system: Set(library_system),
                preferred_formats: Set(formats),
                notifications_enabled: Set(notifications_enabled),
                updated_at: Set(now.into()),
            }
            .insert(self.write_conn())
            .await
            .map_err(Into::into),
        }
    }

    // ========================================================================
    // Notification Operations
    // ========================================================================

    /// Notifications newest first
    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        offset: u64,
        limit: u64,
    ) -> Result<NotificationPage> {
        let mut query = NotificationEventEntity::find()
            .filter(NotificationEventColumn::UserId.eq(user_id));
        if unread_only {
            query = query.filter(NotificationEventColumn::ReadAt.is_null());
        }

        let paginator = query
            .order_by_desc(NotificationEventColumn::CreatedAt)
            .order_by_desc(NotificationEventColumn::Id)
            .paginate(self.read_conn(), limit.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(offset / limit.max(1)).await?;

        Ok(NotificationPage { total, items })
    }

    /// Count unread notifications of a user
    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64> {
        NotificationEventEntity::find()
            .filter(NotificationEventColumn::UserId.eq(user_id))
            .filter(NotificationEventColumn::ReadAt.is_null())
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Mark one notification read; false when it does not belong to the user
    pub async fn mark_notification_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<bool> {
        let Some(event) = NotificationEventEntity::find_by_id(notification_id)
            .one(self.write_conn())
            .await?
        else {
            return Ok(false);
        };

        if event.user_id != user_id {
            return Ok(false);
        }

        if event.read_at.is_none() {
            let mut event: NotificationEventActiveModel = event.into();
            event.read_at = Set(Some(chrono::Utc::now().into()));
            event.update(self.write_conn()).await?;
        }

        Ok(true)
    }

    /// Mark every unread notification of a user read
    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64> {
        let now = DateTimeWithTimeZone::from(chrono::Utc::now());

        let result = NotificationEventEntity::update_many()
            .col_expr(NotificationEventColumn::ReadAt, Expr::value(Some(now)))
            .filter(NotificationEventColumn::UserId.eq(user_id))
            .filter(NotificationEventColumn::ReadAt.is_null())
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    // ========================================================================
    // Account Operations
    // ========================================================================

    /// Delete everything a user owns. Catalog items are shared and stay.
    pub async fn purge_user(&self, user_id: Uuid) -> Result<()> {
        let txn = self.write_conn().begin().await?;
        purge_user_rows(&txn, user_id).await?;
        txn.commit().await?;
        Ok(())
    }
}

async fn purge_user_rows<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<()> {
    NotificationEventEntity::delete_many()
        .filter(NotificationEventColumn::UserId.eq(user_id))
        .exec(conn)
        .await?;
    AvailabilitySnapshotEntity::delete_many()
        .filter(AvailabilitySnapshotColumn::UserId.eq(user_id))
        .exec(conn)
        .await?;
    CatalogMatchEntity::delete_many()
        .filter(CatalogMatchColumn::UserId.eq(user_id))
        .exec(conn)
        .await?;
    SyncRunEntity::delete_many()
        .filter(SyncRunColumn::UserId.eq(user_id))
        .exec(conn)
        .await?;
    ShelfItemEntity::delete_many()
        .filter(ShelfItemColumn::UserId.eq(user_id))
        .exec(conn)
        .await?;
    UserSettingsEntity::delete_many()
        .filter(UserSettingsColumn::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> Repository {
        Repository::new(DbPool::connect_in_memory().await.unwrap())
    }

    async fn shelf_item_id(repo: &Repository, user_id: Uuid) -> Uuid {
        repo.import_shelf_items(
            user_id,
            None,
            &[ShelfEntry {
                external_id: Some("gr-1".to_string()),
                title: Some("Dune".to_string()),
                author: Some("Frank Herbert".to_string()),
                ..ShelfEntry::default()
            }],
        )
        .await
        .unwrap();
        repo.list_shelf_items(user_id).await.unwrap()[0].id
    }

    async fn insert_notification(
        repo: &Repository,
        user_id: Uuid,
        minutes_ago: i64,
    ) -> NotificationEvent {
        let shelf_item_id = shelf_item_id(repo, user_id).await;
        NotificationEventActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            shelf_item_id: Set(shelf_item_id),
            format: Set("ebook".to_string()),
            old_status: Set("hold".to_string()),
            new_status: Set("available".to_string()),
            deep_link: Set(None),
            created_at: Set((chrono::Utc::now() - chrono::Duration::minutes(minutes_ago)).into()),
            read_at: Set(None),
        }
        .insert(repo.write_conn())
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_sync_run_lifecycle() {
        let repo = repo().await;
        let run = repo
            .create_sync_run(Uuid::new_v4(), SyncRunKind::AvailabilityRefresh)
            .await
            .unwrap();
        assert_eq!(run.run_status(), SyncRunStatus::Queued);

        let running = repo.mark_sync_run_running(run.id, 4).await.unwrap();
        assert_eq!(running.run_status(), SyncRunStatus::Running);
        assert_eq!(running.progress_total, 4);
        assert!(running.started_at.is_some());

        repo.update_sync_run_progress(run.id, 2).await.unwrap();
        let done = repo.mark_sync_run_succeeded(run.id).await.unwrap();
        assert_eq!(done.run_status(), SyncRunStatus::Succeeded);
        assert_eq!(done.progress_current, 2);
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_run_cannot_be_rewritten() {
        let repo = repo().await;
        let run = repo
            .create_sync_run(Uuid::new_v4(), SyncRunKind::AvailabilityRefresh)
            .await
            .unwrap();
        repo.mark_sync_run_running(run.id, 1).await.unwrap();
        repo.mark_sync_run_failed(run.id, "provider down").await.unwrap();

        let err = repo.mark_sync_run_succeeded(run.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert!(repo.mark_sync_run_running(run.id, 1).await.is_err());
        assert!(repo.update_sync_run_progress(run.id, 1).await.is_err());
        assert!(repo.mark_sync_run_failed(run.id, "again").await.is_err());

        let stored = repo.find_sync_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.run_status(), SyncRunStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("provider down"));
    }

    #[tokio::test]
    async fn test_missing_run_is_not_found() {
        let repo = repo().await;
        let err = repo.mark_sync_run_running(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, AppError::SyncRunNotFound { .. }));
    }

    #[tokio::test]
    async fn test_notification_read_flow() {
        let repo = repo().await;
        let user = Uuid::new_v4();
        let older = insert_notification(&repo, user, 10).await;
        let newer = insert_notification(&repo, user, 1).await;
        insert_notification(&repo, Uuid::new_v4(), 1).await;

        assert_eq!(repo.unread_count(user).await.unwrap(), 2);

        let page = repo.list_notifications(user, false, 0, 10).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, newer.id);

        // Other users cannot mark it
        assert!(!repo.mark_notification_read(Uuid::new_v4(), older.id).await.unwrap());
        assert!(repo.mark_notification_read(user, older.id).await.unwrap());
        assert!(repo.mark_notification_read(user, older.id).await.unwrap());
        assert_eq!(repo.unread_count(user).await.unwrap(), 1);

        let unread = repo.list_notifications(user, true, 0, 10).await.unwrap();
        assert_eq!(unread.total, 1);
        assert_eq!(unread.items[0].id, newer.id);

        assert_eq!(repo.mark_all_notifications_read(user).await.unwrap(), 1);
        assert_eq!(repo.unread_count(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settings_upsert_and_purge() {
        let repo = repo().await;
        let user = Uuid::new_v4();

        repo.upsert_user_settings(user, Some("lapl".to_string()), &[Format::Audiobook], true)
            .await
            .unwrap();
        let settings = repo
            .upsert_user_settings(user, Some("lapl".to_string()), &[Format::Ebook], false)
            .await
            .unwrap();
        assert_eq!(settings.formats(), vec![Format::Ebook]);
        assert!(!settings.notifications_enabled);

        repo.create_sync_run(user, SyncRunKind::AvailabilityRefresh).await.unwrap();
        insert_notification(&repo, user, 0).await;
        assert_eq!(repo.count_shelf_items(user).await.unwrap(), 1);

        repo.purge_user(user).await.unwrap();

        assert_eq!(repo.count_shelf_items(user).await.unwrap(), 0);
        assert!(repo.find_user_settings(user).await.unwrap().is_none());
        assert!(repo.latest_sync_run_for_user(user).await.unwrap().is_none());
        assert_eq!(repo.unread_count(user).await.unwrap(), 0);
    }
}
