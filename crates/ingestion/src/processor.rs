//! Ingestion processor
//!
//! Applies normalized shelf exports to a user's shelf and, when asked,
//! queues an availability refresh for the changed shelf.

use crate::errors::IngestionError;
use serde::Deserialize;
use shelfsync_common::db::models::SyncRunKind;
use shelfsync_common::db::upsert::{ImportSummary, ShelfEntry};
use shelfsync_common::db::{DbPool, Repository};
use shelfsync_common::metrics;
use shelfsync_common::queue::{Queue, ShelfImportJobMessage, SyncRunJobMessage};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Shelf export file: a bare list or `{"items": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ShelfExport {
    Items(Vec<ShelfEntry>),
    Wrapped { items: Vec<ShelfEntry> },
}

impl ShelfExport {
    fn into_items(self) -> Vec<ShelfEntry> {
        match self {
            ShelfExport::Items(items) | ShelfExport::Wrapped { items } => items,
        }
    }
}

/// Result of one applied import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    /// Refresh run created for the import, if any
    pub sync_run_id: Option<Uuid>,
}

/// Shelf import processor
pub struct ImportProcessor {
    repository: Repository,
    sync_queue: Option<Arc<Queue>>,
}

impl ImportProcessor {
    pub fn new(db_pool: DbPool, sync_queue: Option<Arc<Queue>>) -> Self {
        Self {
            repository: Repository::new(db_pool),
            sync_queue,
        }
    }

    /// Process an import job from SQS
    #[instrument(
        skip(self, message),
        fields(job_id = %message.job_id, user_id = %message.user_id)
    )]
    pub async fn process_job(
        &self,
        message: ShelfImportJobMessage,
    ) -> Result<ImportOutcome, IngestionError> {
        info!(items = message.items.len(), "Processing shelf import job");
        self.apply(
            message.user_id,
            message.source_id,
            &message.items,
            message.refresh_after_import,
        )
        .await
    }

    /// Import a shelf export file directly (for testing without SQS)
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process_file(
        &self,
        path: &Path,
        user_id: Uuid,
        refresh: bool,
    ) -> Result<ImportOutcome, IngestionError> {
        if !path.exists() {
            return Err(IngestionError::FileNotFound(path.display().to_string()));
        }

        let body = tokio::fs::read_to_string(path).await?;
        let items = serde_json::from_str::<ShelfExport>(&body)?.into_items();

        info!(items = items.len(), "Importing shelf export file");
        self.apply(user_id, None, &items, refresh).await
    }

    async fn apply(
        &self,
        user_id: Uuid,
        source_id: Option<Uuid>,
        items: &[ShelfEntry],
        refresh: bool,
    ) -> Result<ImportOutcome, IngestionError> {
        let summary = self.repository.import_shelf_items(user_id, source_id, items).await?;
        metrics::record_import(summary.created, summary.updated);

        for issue in &summary.issues {
            warn!(key = %issue.key, error = %issue.error, "Shelf entry skipped");
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            "Shelf import applied"
        );

        let sync_run_id = if refresh && summary.changed() {
            Some(self.submit_refresh(user_id).await?)
        } else {
            None
        };

        Ok(ImportOutcome { summary, sync_run_id })
    }

    /// Create a queued refresh run and hand it to the sync worker
    async fn submit_refresh(&self, user_id: Uuid) -> Result<Uuid, IngestionError> {
        let run = self
            .repository
            .create_sync_run(user_id, SyncRunKind::AvailabilityRefresh)
            .await?;

        let Some(queue) = &self.sync_queue else {
            warn!(sync_run_id = %run.id, "No sync queue configured, refresh run stays queued");
            return Ok(run.id);
        };

        if let Err(e) = queue.send(&SyncRunJobMessage { sync_run_id: run.id }).await {
            error!(sync_run_id = %run.id, error = %e, "Failed to submit refresh run");
            // Nothing will ever pick the run up
            if let Err(mark) = self
                .repository
                .mark_sync_run_failed(run.id, &format!("Submission failed: {}", e))
                .await
            {
                warn!(sync_run_id = %run.id, error = %mark, "Failed to mark unsubmitted run");
            }
            return Err(e.into());
        }

        info!(sync_run_id = %run.id, "Refresh run submitted");
        Ok(run.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfsync_common::db::models::SyncRunStatus;

    fn entry(external_id: &str, title: &str, author: &str) -> ShelfEntry {
        ShelfEntry {
            external_id: Some(external_id.to_string()),
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            ..ShelfEntry::default()
        }
    }

    fn message(user_id: Uuid, items: Vec<ShelfEntry>, refresh: bool) -> ShelfImportJobMessage {
        ShelfImportJobMessage {
            job_id: Uuid::new_v4(),
            user_id,
            source_id: None,
            items,
            refresh_after_import: refresh,
        }
    }

    async fn setup() -> (ImportProcessor, Repository) {
        let pool = DbPool::connect_in_memory().await.unwrap();
        (ImportProcessor::new(pool.clone(), None), Repository::new(pool))
    }

    #[tokio::test]
    async fn test_import_is_idempotent() {
        let (processor, repo) = setup().await;
        let user = Uuid::new_v4();
        let items = vec![
            entry("gr-1", "Dune", "Frank Herbert"),
            entry("gr-2", "Emma", "Jane Austen"),
        ];

        let first = processor.process_job(message(user, items.clone(), false)).await.unwrap();
        assert_eq!((first.summary.created, first.summary.updated), (2, 0));

        let second = processor.process_job(message(user, items, false)).await.unwrap();
        assert_eq!((second.summary.created, second.summary.updated), (0, 2));
        assert_eq!(repo.count_shelf_items(user).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_refresh_creates_queued_run() {
        let (processor, repo) = setup().await;
        let user = Uuid::new_v4();

        let outcome = processor
            .process_job(message(user, vec![entry("gr-1", "Dune", "Frank Herbert")], true))
            .await
            .unwrap();

        let run_id = outcome.sync_run_id.unwrap();
        let run = repo.find_sync_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.run_status(), SyncRunStatus::Queued);
        assert_eq!(run.user_id, user);
        assert_eq!(run.kind, "availability_refresh");
    }

    #[tokio::test]
    async fn test_no_refresh_without_changes() {
        let (processor, _repo) = setup().await;
        let user = Uuid::new_v4();

        let outcome = processor
            .process_job(message(user, vec![ShelfEntry::default()], true))
            .await
            .unwrap();

        assert_eq!(outcome.summary.skipped, 1);
        assert!(outcome.sync_run_id.is_none());
    }

    #[tokio::test]
    async fn test_process_file_accepts_wrapped_export() {
        let (processor, repo) = setup().await;
        let user = Uuid::new_v4();
        let path = std::env::temp_dir().join(format!("shelf-{}.json", Uuid::new_v4()));
        let export = serde_json::json!({
            "items": [{
                "external_id": "gr-9",
                "title": "Emma",
                "author": "Jane Austen",
                "shelf": "to-read"
            }]
        });
        tokio::fs::write(&path, export.to_string()).await.unwrap();

        let outcome = processor.process_file(&path, user, false).await.unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert_eq!(outcome.summary.created, 1);
        let items = repo.list_shelf_items(user).await.unwrap();
        assert_eq!(items[0].shelf.as_deref(), Some("to-read"));
    }

    #[tokio::test]
    async fn test_process_file_rejects_missing_and_malformed() {
        let (processor, _repo) = setup().await;
        let user = Uuid::new_v4();

        let missing = processor
            .process_file(Path::new("/nonexistent/shelf.json"), user, false)
            .await
            .unwrap_err();
        assert!(matches!(missing, IngestionError::FileNotFound(_)));

        let path = std::env::temp_dir().join(format!("shelf-{}.json", Uuid::new_v4()));
        tokio::fs::write(&path, r#"{"title": "not a list"}"#).await.unwrap();
        let malformed = processor.process_file(&path, user, false).await.unwrap_err();
        tokio::fs::remove_file(&path).await.ok();
        assert!(matches!(malformed, IngestionError::InvalidInput(_)));
    }
}
