//! Availability snapshots and "now available" notifications
//!
//! `apply` persists one batch of availability results and the notifications
//! they trigger in a single transaction. `deliver` pushes the committed
//! notifications to the user's live channel.

use crate::availability::CachedAvailability;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use shelfsync_common::catalog::{AvailabilityStatus, Format};
use shelfsync_common::db::models::*;
use shelfsync_common::db::upsert::upsert_availability_snapshot;
use shelfsync_common::errors::Result;
use shelfsync_common::events::{notify_channel, EventPublisher, LiveEvent};
use shelfsync_common::{metrics, Repository};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Availability of one catalog item format
#[derive(Debug, Clone)]
pub struct AvailabilityUpdate {
    pub catalog_item_id: Uuid,
    pub entry: CachedAvailability,
}

/// Notification committed by `apply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationCreated {
    pub id: Uuid,
    pub shelf_item_id: Uuid,
    pub title: String,
    pub format: Format,
    pub old_status: AvailabilityStatus,
    pub new_status: AvailabilityStatus,
    pub deep_link: Option<String>,
}

/// Whether a status change is worth telling the user about.
///
/// `previous` is `None` on first observation.
pub fn should_notify(previous: Option<AvailabilityStatus>, current: AvailabilityStatus) -> bool {
    matches!(previous, Some(AvailabilityStatus::Hold | AvailabilityStatus::NotOwned))
        && current == AvailabilityStatus::Available
}

pub struct Notifier {
    repo: Repository,
    publisher: Arc<dyn EventPublisher>,
}

impl Notifier {
    pub fn new(repo: Repository, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { repo, publisher }
    }

    /// Persist snapshots for `updates` and create notifications for
    /// transitions into `available`
    pub async fn apply(
        &self,
        user_id: Uuid,
        updates: &[AvailabilityUpdate],
    ) -> Result<Vec<NotificationCreated>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.repo.begin().await?;

        let enabled = UserSettingsEntity::find_by_id(user_id)
            .one(&txn)
            .await?
            .map(|s| s.notifications_enabled)
            .unwrap_or(true);

        let mut catalog_ids: Vec<Uuid> = updates.iter().map(|u| u.catalog_item_id).collect();
        catalog_ids.sort();
        catalog_ids.dedup();

        // Oldest match wins when several shelf items share a catalog item
        let matches = CatalogMatchEntity::find()
            .filter(CatalogMatchColumn::UserId.eq(user_id))
            .filter(CatalogMatchColumn::CatalogItemId.is_in(catalog_ids))
            .order_by_asc(CatalogMatchColumn::CreatedAt)
            .all(&txn)
            .await?;

        let mut shelf_for_catalog: HashMap<Uuid, Uuid> = HashMap::new();
        for m in &matches {
            shelf_for_catalog.entry(m.catalog_item_id).or_insert(m.shelf_item_id);
        }

        let titles: HashMap<Uuid, String> = ShelfItemEntity::find()
            .filter(ShelfItemColumn::Id.is_in(shelf_for_catalog.values().copied()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|item| (item.id, item.title))
            .collect();

        let mut created = Vec::new();
        for update in updates {
            let availability = &update.entry.availability;
            let write = upsert_availability_snapshot(
                &txn,
                user_id,
                update.catalog_item_id,
                availability,
                update.entry.last_checked_at,
            )
            .await?;

            if !enabled || !should_notify(write.previous, availability.status) {
                continue;
            }
            let Some(&shelf_item_id) = shelf_for_catalog.get(&update.catalog_item_id) else {
                debug!(
                    catalog_item_id = %update.catalog_item_id,
                    "No shelf item for available catalog item"
                );
                continue;
            };

            let old_status = write.previous.unwrap_or(AvailabilityStatus::Unknown);
            let event = NotificationEventActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                shelf_item_id: Set(shelf_item_id),
                format: Set(availability.format.as_str().to_string()),
                old_status: Set(old_status.as_str().to_string()),
                new_status: Set(availability.status.as_str().to_string()),
                deep_link: Set(availability.deep_link.clone()),
                created_at: Set(Utc::now().into()),
                read_at: Set(None),
            }
            .insert(&txn)
            .await?;

            created.push(NotificationCreated {
                id: event.id,
                shelf_item_id,
                title: titles.get(&shelf_item_id).cloned().unwrap_or_default(),
                format: availability.format,
                old_status,
                new_status: availability.status,
                deep_link: event.deep_link,
            });
        }

        txn.commit().await?;

        metrics::record_notifications(created.len());
        if !created.is_empty() {
            info!(user_id = %user_id, count = created.len(), "Availability notifications created");
        }

        Ok(created)
    }

    /// Publish committed notifications; failures are logged and dropped
    pub async fn deliver(&self, user_id: Uuid, created: &[NotificationCreated]) {
        let channel = notify_channel(user_id);

        for notification in created {
            let payload = match serde_json::to_value(notification) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(
                        notification_id = %notification.id,
                        error = %e,
                        "Failed to encode notification"
                    );
                    continue;
                }
            };

            let event = LiveEvent::new("notification", payload);
            if let Err(e) = self.publisher.publish(&channel, &event).await {
                warn!(
                    user_id = %user_id,
                    notification_id = %notification.id,
                    error = %e,
                    "Notification delivery failed"
                );
                metrics::record_publish_failure("notify");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelfsync_common::catalog::{ProviderAvailability, ProviderBook};
    use shelfsync_common::db::upsert::{upsert_catalog_item, upsert_match, MatchRecord, ShelfEntry};
    use shelfsync_common::events::MemoryPublisher;
    use shelfsync_common::DbPool;

    struct Fixture {
        repo: Repository,
        publisher: Arc<MemoryPublisher>,
        notifier: Notifier,
        user: Uuid,
        shelf_item_id: Uuid,
        catalog_item_id: Uuid,
    }

    async fn setup() -> Fixture {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let repo = Repository::new(pool.clone());
        let publisher = MemoryPublisher::new();
        let notifier = Notifier::new(repo.clone(), publisher.clone());
        let user = Uuid::new_v4();

        repo.import_shelf_items(
            user,
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
        let shelf_item_id = repo.list_shelf_items(user).await.unwrap()[0].id;

        let catalog = upsert_catalog_item(
            pool.write(),
            &ProviderBook {
                provider: "fixture".to_string(),
                provider_item_id: "od-dune".to_string(),
                title: "Dune".to_string(),
                author: Some("Frank Herbert".to_string()),
                isbn10: None,
                isbn13: None,
                asin: None,
                raw: json!({}),
            },
        )
        .await
        .unwrap();

        upsert_match(
            pool.write(),
            MatchRecord {
                user_id: user,
                shelf_item_id,
                catalog_item_id: catalog.id,
                provider: "fixture",
                method: MatchMethod::Fuzzy,
                confidence: 1.0,
                evidence: json!({}),
            },
        )
        .await
        .unwrap();

        Fixture {
            repo,
            publisher,
            notifier,
            user,
            shelf_item_id,
            catalog_item_id: catalog.id,
        }
    }

    fn update(
        catalog_item_id: Uuid,
        format: Format,
        status: AvailabilityStatus,
    ) -> AvailabilityUpdate {
        AvailabilityUpdate {
            catalog_item_id,
            entry: CachedAvailability {
                availability: ProviderAvailability {
                    status,
                    deep_link: Some("https://library.example/dune".to_string()),
                    ..ProviderAvailability::not_owned("fixture", "od-dune", format)
                },
                last_checked_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_notification_gating_matrix() {
        use AvailabilityStatus::*;

        let statuses = [Available, Hold, NotOwned, Unknown];
        for previous in statuses {
            for current in statuses {
                let expected = matches!(previous, Hold | NotOwned) && current == Available;
                assert_eq!(
                    should_notify(Some(previous), current),
                    expected,
                    "{previous} -> {current}"
                );
            }
            assert!(!should_notify(None, previous));
        }
    }

    #[tokio::test]
    async fn test_hold_to_available_notifies() {
        let f = setup().await;

        let first = f
            .notifier
            .apply(f.user, &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Hold)])
            .await
            .unwrap();
        assert!(first.is_empty());

        let second = f
            .notifier
            .apply(
                f.user,
                &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Available)],
            )
            .await
            .unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].shelf_item_id, f.shelf_item_id);
        assert_eq!(second[0].title, "Dune");
        assert_eq!(second[0].old_status, AvailabilityStatus::Hold);
        assert_eq!(second[0].new_status, AvailabilityStatus::Available);

        let page = f.repo.list_notifications(f.user, true, 0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].format, "ebook");
        assert_eq!(page.items[0].deep_link.as_deref(), Some("https://library.example/dune"));
    }

    #[tokio::test]
    async fn test_first_observation_never_notifies() {
        let f = setup().await;

        let created = f
            .notifier
            .apply(
                f.user,
                &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Available)],
            )
            .await
            .unwrap();

        assert!(created.is_empty());
        let snapshots = f.repo.list_snapshots(f.user, Some(f.catalog_item_id)).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].availability_status(), AvailabilityStatus::Available);
    }

    #[tokio::test]
    async fn test_available_to_available_is_quiet() {
        let f = setup().await;
        let batch = [update(f.catalog_item_id, Format::Audiobook, AvailabilityStatus::Available)];

        f.notifier.apply(f.user, &batch).await.unwrap();
        let created = f.notifier.apply(f.user, &batch).await.unwrap();

        assert!(created.is_empty());
        assert_eq!(f.repo.unread_count(f.user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_preferences_suppress_notifications() {
        let f = setup().await;
        f.repo
            .upsert_user_settings(f.user, None, &[], false)
            .await
            .unwrap();

        f.notifier
            .apply(
                f.user,
                &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::NotOwned)],
            )
            .await
            .unwrap();
        let created = f
            .notifier
            .apply(
                f.user,
                &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Available)],
            )
            .await
            .unwrap();

        assert!(created.is_empty());
        let snapshots = f.repo.list_snapshots(f.user, None).await.unwrap();
        assert_eq!(snapshots[0].availability_status(), AvailabilityStatus::Available);
    }

    #[tokio::test]
    async fn test_unmapped_catalog_item_is_skipped() {
        let f = setup().await;
        let stranger = Uuid::new_v4();

        f.notifier
            .apply(stranger, &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Hold)])
            .await
            .unwrap();
        let created = f
            .notifier
            .apply(
                stranger,
                &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Available)],
            )
            .await
            .unwrap();

        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_delivery_goes_to_notify_channel() {
        let f = setup().await;

        f.notifier
            .apply(f.user, &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Hold)])
            .await
            .unwrap();
        let created = f
            .notifier
            .apply(
                f.user,
                &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Available)],
            )
            .await
            .unwrap();
        f.notifier.deliver(f.user, &created).await;

        let events = f.publisher.events_on(&notify_channel(f.user));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "notification");
        assert_eq!(events[0].payload["format"], "ebook");
        assert_eq!(events[0].payload["new_status"], "available");
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_notifications() {
        let f = setup().await;
        f.publisher.set_failing(true);

        f.notifier
            .apply(f.user, &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Hold)])
            .await
            .unwrap();
        let created = f
            .notifier
            .apply(
                f.user,
                &[update(f.catalog_item_id, Format::Ebook, AvailabilityStatus::Available)],
            )
            .await
            .unwrap();
        f.notifier.deliver(f.user, &created).await;

        assert!(f.publisher.events().is_empty());
        assert_eq!(f.repo.unread_count(f.user).await.unwrap(), 1);
    }
}
