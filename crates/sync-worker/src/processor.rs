//! Sync run processor
//!
//! Executes one availability refresh for a user: match shelf items to the
//! catalog, fetch availability through the cache, persist snapshots and
//! notifications, and report progress on the run's live channel.

use crate::availability::AvailabilityCache;
use crate::errors::SyncError;
use crate::matcher::{match_shelf_item, MatchSubject};
use crate::notifier::{AvailabilityUpdate, Notifier};
use chrono::Utc;
use serde_json::json;
use shelfsync_common::cache::CacheBackend;
use shelfsync_common::catalog::{CatalogProvider, Format};
use shelfsync_common::config::AppConfig;
use shelfsync_common::db::models::{CatalogItem, ShelfItem, SyncRun, SyncRunStatus};
use shelfsync_common::db::upsert::{upsert_catalog_item, upsert_match, MatchRecord};
use shelfsync_common::db::{DbPool, Repository};
use shelfsync_common::events::{sync_channel, EventPublisher, LiveEvent};
use shelfsync_common::metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Processor settings
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Shelf items per batch
    pub batch_size: usize,
    /// Candidates requested from the provider per shelf item
    pub search_limit: usize,
    /// TTL of cached availability
    pub cache_ttl: Duration,
    /// Library system for users without one
    pub default_library_system: String,
    /// Formats for users without a preference
    pub default_formats: Vec<Format>,
    /// How long a running run may stay silent before it counts as abandoned
    pub run_lease: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            search_limit: 10,
            cache_ttl: Duration::from_secs(300),
            default_library_system: "default".to_string(),
            default_formats: Format::ALL.to_vec(),
            run_lease: Duration::from_secs(600),
        }
    }
}

impl ProcessorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        let mut default_formats: Vec<Format> = config
            .availability
            .default_formats
            .iter()
            .filter_map(|f| Format::parse(f))
            .collect();
        default_formats.sort();
        default_formats.dedup();
        if default_formats.is_empty() {
            default_formats = Format::ALL.to_vec();
        }

        Self {
            batch_size: config.availability.batch_size.max(1),
            search_limit: config.catalog.search_limit.max(1),
            cache_ttl: Duration::from_secs(config.availability.cache_ttl_secs),
            default_library_system: config.availability.default_library_system.clone(),
            default_formats,
            run_lease: config.job_timeout(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRunOutcome {
    Succeeded {
        total: i32,
        matched: usize,
        unmatched: usize,
        notifications: usize,
    },
    Failed {
        message: String,
    },
    /// The run was already terminal and was left untouched
    Skipped {
        status: SyncRunStatus,
    },
}

#[derive(Debug, Default)]
struct Progress {
    current: i32,
    total: i32,
    matched: usize,
    unmatched: usize,
    notifications: usize,
}

/// Sync run processor
pub struct SyncRunProcessor {
    repository: Repository,
    provider: Arc<dyn CatalogProvider>,
    availability: AvailabilityCache,
    notifier: Notifier,
    publisher: Arc<dyn EventPublisher>,
    config: ProcessorConfig,
}

impl SyncRunProcessor {
    pub fn new(
        db_pool: DbPool,
        provider: Arc<dyn CatalogProvider>,
        cache: Option<Arc<dyn CacheBackend>>,
        publisher: Arc<dyn EventPublisher>,
        config: ProcessorConfig,
    ) -> Self {
        // Run state and per-run reads must not lag behind our own writes
        let repository = Repository::new(db_pool.primary_only());
        Self {
            availability: AvailabilityCache::new(provider.clone(), cache, config.cache_ttl),
            notifier: Notifier::new(repository.clone(), publisher.clone()),
            repository,
            provider,
            publisher,
            config,
        }
    }

    /// Run with a wall-clock bound; an elapsed run is marked failed
    pub async fn run_with_timeout(
        &self,
        run_id: Uuid,
        timeout: Duration,
    ) -> Result<SyncRunOutcome, SyncError> {
        match tokio::time::timeout(timeout, self.run(run_id)).await {
            Ok(result) => result,
            Err(_) => {
                let message = SyncError::Timeout(timeout.as_secs()).to_string();
                error!(
                    sync_run_id = %run_id,
                    timeout_secs = timeout.as_secs(),
                    "Sync run timed out"
                );

                let run = self
                    .repository
                    .find_sync_run(run_id)
                    .await?
                    .ok_or_else(|| SyncError::RunNotFound(run_id.to_string()))?;
                let progress = Progress {
                    current: run.progress_current,
                    total: run.progress_total,
                    ..Progress::default()
                };
                self.fail(&run, &progress, &message, Instant::now()).await
            }
        }
    }

    /// Execute one sync run to a terminal state
    #[instrument(skip(self), fields(sync_run_id = %run_id))]
    pub async fn run(&self, run_id: Uuid) -> Result<SyncRunOutcome, SyncError> {
        let start = Instant::now();

        let run = self
            .repository
            .find_sync_run(run_id)
            .await?
            .ok_or_else(|| SyncError::RunNotFound(run_id.to_string()))?;

        match run.run_status() {
            SyncRunStatus::Queued => {}
            SyncRunStatus::Running => {
                let idle = run.idle_for(Utc::now());
                if idle < self.config.run_lease {
                    info!(idle_secs = idle.as_secs(), "Sync run held by another worker");
                    return Err(SyncError::RunInProgress(run_id.to_string()));
                }

                // The worker holding it stopped reporting
                warn!(
                    user_id = %run.user_id,
                    idle_secs = idle.as_secs(),
                    "Sync run lease expired, marking interrupted"
                );
                let progress = Progress {
                    current: run.progress_current,
                    total: run.progress_total,
                    ..Progress::default()
                };
                return self
                    .fail(&run, &progress, "Sync run interrupted before completion", start)
                    .await;
            }
            status => {
                info!(status = %status, "Sync run already finished, skipping");
                return Ok(SyncRunOutcome::Skipped { status });
            }
        }

        let items = self.repository.list_shelf_items(run.user_id).await?;
        let mut progress = Progress {
            total: items.len() as i32,
            ..Progress::default()
        };

        self.repository.mark_sync_run_running(run_id, progress.total).await?;
        info!(user_id = %run.user_id, total = progress.total, "Sync run started");
        self.emit_progress(&run, &progress).await;

        match self.execute(&run, &items, &mut progress).await {
            Ok(()) => {
                self.repository.mark_sync_run_succeeded(run_id).await?;
                self.emit(
                    &run,
                    "succeeded",
                    json!({"current": progress.current, "total": progress.total}),
                )
                .await;

                metrics::record_sync_run("succeeded", start.elapsed().as_secs_f64());
                info!(
                    matched = progress.matched,
                    unmatched = progress.unmatched,
                    notifications = progress.notifications,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Sync run succeeded"
                );

                Ok(SyncRunOutcome::Succeeded {
                    total: progress.total,
                    matched: progress.matched,
                    unmatched: progress.unmatched,
                    notifications: progress.notifications,
                })
            }
            Err(e) => {
                error!(error = %e, current = progress.current, "Sync run failed");
                self.fail(&run, &progress, &e.to_string(), start).await
            }
        }
    }

    async fn execute(
        &self,
        run: &SyncRun,
        items: &[ShelfItem],
        progress: &mut Progress,
    ) -> Result<(), SyncError> {
        let settings = self.repository.find_user_settings(run.user_id).await?;

        let library_system = settings
            .as_ref()
            .and_then(|s| s.library_system.clone())
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.config.default_library_system.clone());

        let formats = settings
            .as_ref()
            .map(|s| s.formats())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| self.config.default_formats.clone());

        for batch in items.chunks(self.config.batch_size.max(1)) {
            debug!(
                batch_size = batch.len(),
                current = progress.current,
                total = progress.total,
                "Processing batch"
            );

            // provider_item_id -> catalog item id
            let mut catalog_ids: BTreeMap<String, Uuid> = BTreeMap::new();
            for item in batch {
                match self.resolve(run.user_id, item).await? {
                    Some(catalog_item) => {
                        progress.matched += 1;
                        catalog_ids.insert(catalog_item.provider_item_id, catalog_item.id);
                    }
                    None => progress.unmatched += 1,
                }
            }

            if !catalog_ids.is_empty() {
                let provider_item_ids: Vec<String> = catalog_ids.keys().cloned().collect();
                let mut availability = self
                    .availability
                    .get_availability(&library_system, &provider_item_ids, &formats)
                    .await?;

                let mut updates = Vec::with_capacity(catalog_ids.len() * formats.len());
                for (provider_item_id, catalog_item_id) in &catalog_ids {
                    for format in &formats {
                        let key = (provider_item_id.clone(), *format);
                        if let Some(entry) = availability.remove(&key) {
                            updates.push(AvailabilityUpdate {
                                catalog_item_id: *catalog_item_id,
                                entry,
                            });
                        }
                    }
                }

                let created = self.notifier.apply(run.user_id, &updates).await?;
                progress.notifications += created.len();
                self.notifier.deliver(run.user_id, &created).await;
            }

            progress.current += batch.len() as i32;
            self.repository.update_sync_run_progress(run.id, progress.current).await?;
            self.emit_progress(run, progress).await;
        }

        Ok(())
    }

    /// Match a shelf item against the catalog and persist the result.
    ///
    /// Every run re-matches so edits made by a re-import take effect; the
    /// stored match of the item is replaced in place.
    async fn resolve(
        &self,
        user_id: Uuid,
        item: &ShelfItem,
    ) -> Result<Option<CatalogItem>, SyncError> {
        let start = Instant::now();
        let subject = MatchSubject::from(item);
        let result =
            match_shelf_item(self.provider.as_ref(), &subject, self.config.search_limit).await;
        metrics::record_provider_call(
            self.provider.name(),
            "search",
            start.elapsed().as_secs_f64(),
            result.is_ok(),
        );

        let Some(result) = result? else {
            metrics::record_match(None);
            debug!(shelf_item_id = %item.id, title = %item.title, "No acceptable catalog match");
            return Ok(None);
        };

        let txn = self.repository.begin().await?;
        let catalog_item = upsert_catalog_item(&txn, &result.book).await?;
        upsert_match(
            &txn,
            MatchRecord {
                user_id,
                shelf_item_id: item.id,
                catalog_item_id: catalog_item.id,
                provider: &result.book.provider,
                method: result.method,
                confidence: result.confidence,
                evidence: result.evidence,
            },
        )
        .await?;
        txn.commit().await?;

        metrics::record_match(Some(result.method.as_str()));
        debug!(
            shelf_item_id = %item.id,
            catalog_item_id = %catalog_item.id,
            method = result.method.as_str(),
            confidence = result.confidence,
            "Shelf item matched"
        );

        Ok(Some(catalog_item))
    }

    async fn fail(
        &self,
        run: &SyncRun,
        progress: &Progress,
        message: &str,
        start: Instant,
    ) -> Result<SyncRunOutcome, SyncError> {
        self.repository.mark_sync_run_failed(run.id, message).await?;
        self.emit(
            run,
            "failed",
            json!({"message": message, "current": progress.current, "total": progress.total}),
        )
        .await;

        metrics::record_sync_run("failed", start.elapsed().as_secs_f64());

        Ok(SyncRunOutcome::Failed {
            message: message.to_string(),
        })
    }

    async fn emit_progress(&self, run: &SyncRun, progress: &Progress) {
        self.emit(
            run,
            "progress",
            json!({"current": progress.current, "total": progress.total}),
        )
        .await;
    }

    async fn emit(&self, run: &SyncRun, event_type: &str, payload: serde_json::Value) {
        let channel = sync_channel(run.user_id, run.id);
        let event = LiveEvent::new(event_type, payload);

        if let Err(e) = self.publisher.publish(&channel, &event).await {
            warn!(channel = %channel, event_type, error = %e, "Failed to publish sync event");
            metrics::record_publish_failure("sync");
        }
    }
}
