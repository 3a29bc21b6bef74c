//! Natural-key upserts for the match/availability store
//!
//! Every function takes any connection so callers can compose them inside
//! one transaction. Writes are last-write-wins.

use crate::catalog::{AvailabilityStatus, ProviderAvailability, ProviderBook};
use crate::db::models::*;
use crate::errors::{AppError, Result};
use crate::normalize::build_identity;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// One normalized row of a shelf export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfEntry {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub isbn10: Option<String>,
    #[serde(default)]
    pub isbn13: Option<String>,
    #[serde(default)]
    pub asin: Option<String>,
    #[serde(default)]
    pub shelf: Option<String>,
}

/// A shelf entry that could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportIssue {
    pub key: String,
    pub error: String,
}

/// Outcome of a shelf import batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub issues: Vec<ImportIssue>,
}

impl ImportSummary {
    pub fn changed(&self) -> bool {
        self.created + self.updated > 0
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Create or update shelf items for one user and source.
///
/// Rows are keyed by `external_id` when the entry carries one, otherwise by
/// identity key. Entries missing a title or author are skipped.
pub async fn upsert_shelf_items<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    source_id: Option<Uuid>,
    entries: &[ShelfEntry],
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let now = Utc::now();

    for entry in entries {
        let title = trimmed(&entry.title);
        let author = trimmed(&entry.author);
        let external_id = trimmed(&entry.external_id);

        let (Some(title), Some(author)) = (title, author) else {
            summary.skipped += 1;
            summary.issues.push(ImportIssue {
                key: external_id
                    .clone()
                    .or_else(|| trimmed(&entry.title))
                    .unwrap_or_else(|| "<unknown>".to_string()),
                error: "missing title or author".to_string(),
            });
            continue;
        };

        let identity = build_identity(
            &title,
            &author,
            entry.isbn13.as_deref(),
            entry.isbn10.as_deref(),
            entry.asin.as_deref(),
        );

        let mut query = ShelfItemEntity::find().filter(ShelfItemColumn::UserId.eq(user_id));
        query = match source_id {
            Some(source) => query.filter(ShelfItemColumn::SourceId.eq(source)),
            None => query.filter(ShelfItemColumn::SourceId.is_null()),
        };
        query = match &external_id {
            Some(ext) => query.filter(ShelfItemColumn::ExternalId.eq(ext.as_str())),
            None => query.filter(ShelfItemColumn::IdentityKey.eq(identity.identity_key.as_str())),
        };

        match query.one(conn).await? {
            Some(existing) => {
                let mut item: ShelfItemActiveModel = existing.into();
                item.title = Set(title);
                item.author = Set(author);
                item.isbn10 = Set(identity.isbn10);
                item.isbn13 = Set(identity.isbn13);
                item.asin = Set(identity.asin);
                item.normalized_title = Set(identity.normalized_title);
                item.normalized_author = Set(identity.normalized_author);
                item.identity_key = Set(identity.identity_key);
                item.shelf = Set(trimmed(&entry.shelf));
                item.needs_fuzzy_match = Set(identity.needs_fuzzy_match);
                item.updated_at = Set(now.into());
                item.update(conn).await?;
                summary.updated += 1;
            }
            None => {
                ShelfItemActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    source_id: Set(source_id),
                    external_id: Set(external_id),
                    title: Set(title),
                    author: Set(author),
                    isbn10: Set(identity.isbn10),
                    isbn13: Set(identity.isbn13),
                    asin: Set(identity.asin),
                    normalized_title: Set(identity.normalized_title),
                    normalized_author: Set(identity.normalized_author),
                    identity_key: Set(identity.identity_key),
                    shelf: Set(trimmed(&entry.shelf)),
                    needs_fuzzy_match: Set(identity.needs_fuzzy_match),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                }
                .insert(conn)
                .await?;
                summary.created += 1;
            }
        }
    }

    debug!(
        user_id = %user_id,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "Shelf items upserted"
    );

    Ok(summary)
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

async fn find_catalog_item<C: ConnectionTrait>(
    conn: &C,
    provider: &str,
    provider_item_id: &str,
) -> Result<Option<CatalogItem>> {
    CatalogItemEntity::find()
        .filter(CatalogItemColumn::Provider.eq(provider))
        .filter(CatalogItemColumn::ProviderItemId.eq(provider_item_id))
        .one(conn)
        .await
        .map_err(Into::into)
}

async fn refresh_catalog_item<C: ConnectionTrait>(
    conn: &C,
    existing: CatalogItem,
    book: &ProviderBook,
) -> Result<CatalogItem> {
    let mut item: CatalogItemActiveModel = existing.into();
    item.title = Set(book.title.clone());
    item.author = Set(book.author.clone());
    item.isbn10 = Set(book.isbn10.clone());
    item.isbn13 = Set(book.isbn13.clone());
    item.asin = Set(book.asin.clone());
    item.raw = Set(book.raw.clone());
    item.updated_at = Set(Utc::now().into());
    item.update(conn).await.map_err(Into::into)
}

/// Create or refresh the catalog item for `(provider, provider_item_id)`.
///
/// A concurrent insert of the same key surfaces as a unique violation; the
/// insert runs in a savepoint so the caller's transaction survives and the
/// row written by the other writer is updated instead.
pub async fn upsert_catalog_item<C>(conn: &C, book: &ProviderBook) -> Result<CatalogItem>
where
    C: ConnectionTrait + TransactionTrait,
{
    if let Some(existing) = find_catalog_item(conn, &book.provider, &book.provider_item_id).await? {
        return refresh_catalog_item(conn, existing, book).await;
    }

    let now = Utc::now();
    let savepoint = conn.begin().await?;
    let inserted = CatalogItemActiveModel {
        id: Set(Uuid::new_v4()),
        provider: Set(book.provider.clone()),
        provider_item_id: Set(book.provider_item_id.clone()),
        title: Set(book.title.clone()),
        author: Set(book.author.clone()),
        isbn10: Set(book.isbn10.clone()),
        isbn13: Set(book.isbn13.clone()),
        asin: Set(book.asin.clone()),
        raw: Set(book.raw.clone()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&savepoint)
    .await;

    match inserted {
        Ok(item) => {
            savepoint.commit().await?;
            Ok(item)
        }
        Err(e) if is_unique_violation(&e) => {
            savepoint.rollback().await?;
            debug!(
                provider = %book.provider,
                provider_item_id = %book.provider_item_id,
                "Catalog item inserted concurrently, updating instead"
            );
            let existing = find_catalog_item(conn, &book.provider, &book.provider_item_id)
                .await?
                .ok_or_else(|| AppError::Internal {
                    message: format!(
                        "Catalog item {}:{} vanished after unique violation",
                        book.provider, book.provider_item_id
                    ),
                })?;
            refresh_catalog_item(conn, existing, book).await
        }
        Err(e) => {
            savepoint.rollback().await?;
            Err(e.into())
        }
    }
}

/// Resolved match to persist for a shelf item
#[derive(Debug, Clone)]
pub struct MatchRecord<'a> {
    pub user_id: Uuid,
    pub shelf_item_id: Uuid,
    pub catalog_item_id: Uuid,
    pub provider: &'a str,
    pub method: MatchMethod,
    pub confidence: f64,
    pub evidence: serde_json::Value,
}

async fn find_match<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    shelf_item_id: Uuid,
) -> Result<Option<CatalogMatch>> {
    CatalogMatchEntity::find()
        .filter(CatalogMatchColumn::UserId.eq(user_id))
        .filter(CatalogMatchColumn::ShelfItemId.eq(shelf_item_id))
        .one(conn)
        .await
        .map_err(Into::into)
}

async fn refresh_match<C: ConnectionTrait>(
    conn: &C,
    existing: CatalogMatch,
    record: &MatchRecord<'_>,
) -> Result<CatalogMatch> {
    let mut row: CatalogMatchActiveModel = existing.into();
    row.catalog_item_id = Set(record.catalog_item_id);
    row.provider = Set(record.provider.to_string());
    row.method = Set(record.method.into());
    row.confidence = Set(record.confidence);
    row.evidence = Set(record.evidence.clone());
    row.updated_at = Set(Utc::now().into());
    row.update(conn).await.map_err(Into::into)
}

/// Create or replace the single match of a shelf item
pub async fn upsert_match<C>(conn: &C, record: MatchRecord<'_>) -> Result<CatalogMatch>
where
    C: ConnectionTrait + TransactionTrait,
{
    let existing = find_match(conn, record.user_id, record.shelf_item_id).await?;
    write_match(conn, existing, &record).await
}

/// Update `existing`, or insert in a savepoint and fall back to an update
/// when another run inserted the row after the lookup.
async fn write_match<C>(
    conn: &C,
    existing: Option<CatalogMatch>,
    record: &MatchRecord<'_>,
) -> Result<CatalogMatch>
where
    C: ConnectionTrait + TransactionTrait,
{
    if let Some(existing) = existing {
        return refresh_match(conn, existing, record).await;
    }

    let now = Utc::now();
    let savepoint = conn.begin().await?;
    let inserted = CatalogMatchActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(record.user_id),
        shelf_item_id: Set(record.shelf_item_id),
        catalog_item_id: Set(record.catalog_item_id),
        provider: Set(record.provider.to_string()),
        method: Set(record.method.into()),
        confidence: Set(record.confidence),
        evidence: Set(record.evidence.clone()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&savepoint)
    .await;

    match inserted {
        Ok(row) => {
            savepoint.commit().await?;
            Ok(row)
        }
        Err(e) if is_unique_violation(&e) => {
            savepoint.rollback().await?;
            debug!(
                shelf_item_id = %record.shelf_item_id,
                "Match inserted concurrently, updating instead"
            );
            let existing = find_match(conn, record.user_id, record.shelf_item_id)
                .await?
                .ok_or_else(|| AppError::Internal {
                    message: format!(
                        "Match of shelf item {} vanished after unique violation",
                        record.shelf_item_id
                    ),
                })?;
            refresh_match(conn, existing, record).await
        }
        Err(e) => {
            savepoint.rollback().await?;
            Err(e.into())
        }
    }
}

/// Result of writing one snapshot
#[derive(Debug, Clone)]
pub struct SnapshotWrite {
    pub snapshot: AvailabilitySnapshot,
    /// Status stored before this write, `None` on first observation
    pub previous: Option<AvailabilityStatus>,
}

/// Fields of one snapshot write
struct SnapshotKey<'a> {
    user_id: Uuid,
    catalog_item_id: Uuid,
    availability: &'a ProviderAvailability,
    checked_at: DateTime<Utc>,
}

async fn find_snapshot<C: ConnectionTrait>(
    conn: &C,
    key: &SnapshotKey<'_>,
) -> Result<Option<AvailabilitySnapshot>> {
    AvailabilitySnapshotEntity::find()
        .filter(AvailabilitySnapshotColumn::UserId.eq(key.user_id))
        .filter(AvailabilitySnapshotColumn::CatalogItemId.eq(key.catalog_item_id))
        .filter(AvailabilitySnapshotColumn::Format.eq(key.availability.format.as_str()))
        .one(conn)
        .await
        .map_err(Into::into)
}

async fn refresh_snapshot<C: ConnectionTrait>(
    conn: &C,
    existing: AvailabilitySnapshot,
    key: &SnapshotKey<'_>,
) -> Result<SnapshotWrite> {
    let previous = Some(existing.availability_status());
    let availability = key.availability;

    let mut row: AvailabilitySnapshotActiveModel = existing.into();
    row.status = Set(availability.status.as_str().to_string());
    row.copies_available = Set(availability.copies_available);
    row.copies_total = Set(availability.copies_total);
    row.holds = Set(availability.holds);
    row.deep_link = Set(availability.deep_link.clone());
    row.last_checked_at = Set(key.checked_at.into());
    let snapshot = row.update(conn).await?;

    Ok(SnapshotWrite { snapshot, previous })
}

/// Create or overwrite the snapshot for `(user, catalog_item, format)`
pub async fn upsert_availability_snapshot<C>(
    conn: &C,
    user_id: Uuid,
    catalog_item_id: Uuid,
    availability: &ProviderAvailability,
    checked_at: DateTime<Utc>,
) -> Result<SnapshotWrite>
where
    C: ConnectionTrait + TransactionTrait,
{
    let key = SnapshotKey {
        user_id,
        catalog_item_id,
        availability,
        checked_at,
    };
    let existing = find_snapshot(conn, &key).await?;
    write_snapshot(conn, existing, &key).await
}

async fn write_snapshot<C>(
    conn: &C,
    existing: Option<AvailabilitySnapshot>,
    key: &SnapshotKey<'_>,
) -> Result<SnapshotWrite>
where
    C: ConnectionTrait + TransactionTrait,
{
    if let Some(existing) = existing {
        return refresh_snapshot(conn, existing, key).await;
    }

    let availability = key.availability;
    let savepoint = conn.begin().await?;
    let inserted = AvailabilitySnapshotActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(key.user_id),
        catalog_item_id: Set(key.catalog_item_id),
        format: Set(availability.format.as_str().to_string()),
        status: Set(availability.status.as_str().to_string()),
        copies_available: Set(availability.copies_available),
        copies_total: Set(availability.copies_total),
        holds: Set(availability.holds),
        deep_link: Set(availability.deep_link.clone()),
        last_checked_at: Set(key.checked_at.into()),
    }
    .insert(&savepoint)
    .await;

    match inserted {
        Ok(snapshot) => {
            savepoint.commit().await?;
            Ok(SnapshotWrite { snapshot, previous: None })
        }
        Err(e) if is_unique_violation(&e) => {
            savepoint.rollback().await?;
            debug!(
                catalog_item_id = %key.catalog_item_id,
                format = availability.format.as_str(),
                "Snapshot inserted concurrently, updating instead"
            );
            let existing = find_snapshot(conn, key).await?.ok_or_else(|| AppError::Internal {
                message: format!(
                    "Snapshot of catalog item {} vanished after unique violation",
                    key.catalog_item_id
                ),
            })?;
            refresh_snapshot(conn, existing, key).await
        }
        Err(e) => {
            savepoint.rollback().await?;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Format;
    use crate::db::DbPool;
    use sea_orm::PaginatorTrait;
    use serde_json::json;

    fn entry(
        external_id: Option<&str>,
        title: &str,
        author: &str,
        isbn13: Option<&str>,
    ) -> ShelfEntry {
        ShelfEntry {
            external_id: external_id.map(str::to_string),
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            isbn13: isbn13.map(str::to_string),
            shelf: Some("to-read".to_string()),
            ..ShelfEntry::default()
        }
    }

    fn book(provider_item_id: &str, title: &str) -> ProviderBook {
        ProviderBook {
            provider: "fixture".to_string(),
            provider_item_id: provider_item_id.to_string(),
            title: title.to_string(),
            author: Some("Someone".to_string()),
            isbn10: None,
            isbn13: None,
            asin: None,
            raw: json!({"provider_item_id": provider_item_id}),
        }
    }

    #[tokio::test]
    async fn test_shelf_upsert_is_idempotent() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let source = Some(Uuid::new_v4());
        let batch = vec![
            entry(Some("gr-1"), "Dune", "Frank Herbert", None),
            entry(Some("gr-2"), "Project Hail Mary", "Andy Weir", Some("9780593135204")),
            entry(None, "The Hobbit", "J.R.R. Tolkien", None),
        ];

        let first = upsert_shelf_items(pool.write(), user, source, &batch).await.unwrap();
        assert_eq!((first.created, first.updated, first.skipped), (3, 0, 0));

        let second = upsert_shelf_items(pool.write(), user, source, &batch).await.unwrap();
        assert_eq!((second.created, second.updated, second.skipped), (0, 3, 0));

        let count = ShelfItemEntity::find()
            .filter(ShelfItemColumn::UserId.eq(user))
            .count(pool.read())
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_shelf_upsert_skips_incomplete_entries() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let batch = vec![
            ShelfEntry {
                external_id: Some("gr-9".to_string()),
                title: Some("Untitled".to_string()),
                author: Some("   ".to_string()),
                ..ShelfEntry::default()
            },
            entry(None, "Dune", "Frank Herbert", None),
        ];

        let summary = upsert_shelf_items(pool.write(), Uuid::new_v4(), None, &batch).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.issues[0].key, "gr-9");
    }

    #[tokio::test]
    async fn test_catalog_item_upsert_keeps_one_row() {
        let pool = DbPool::connect_in_memory().await.unwrap();

        let first = upsert_catalog_item(pool.write(), &book("od-1", "Dune")).await.unwrap();
        let second = upsert_catalog_item(pool.write(), &book("od-1", "Dune (Deluxe Edition)"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Dune (Deluxe Edition)");
        assert_eq!(CatalogItemEntity::find().count(pool.read()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_catalog_item_upsert_inside_transaction() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let txn = pool.begin().await.unwrap();
        let item = upsert_catalog_item(&txn, &book("od-2", "Emma")).await.unwrap();
        txn.commit().await.unwrap();

        let found = CatalogItemEntity::find_by_id(item.id).one(pool.read()).await.unwrap();
        assert!(found.is_some());
    }

    async fn shelf_item_id(pool: &DbPool, user: Uuid) -> Uuid {
        let dune = [entry(Some("gr-1"), "Dune", "Frank Herbert", None)];
        upsert_shelf_items(pool.write(), user, None, &dune).await.unwrap();
        ShelfItemEntity::find()
            .filter(ShelfItemColumn::UserId.eq(user))
            .one(pool.read())
            .await
            .unwrap()
            .unwrap()
            .id
    }

    fn match_record(
        user: Uuid,
        shelf_item: Uuid,
        catalog_item: Uuid,
        method: MatchMethod,
    ) -> MatchRecord<'static> {
        MatchRecord {
            user_id: user,
            shelf_item_id: shelf_item,
            catalog_item_id: catalog_item,
            provider: "fixture",
            method,
            confidence: 0.9,
            evidence: json!({}),
        }
    }

    #[tokio::test]
    async fn test_match_upsert_replaces_previous_match() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let shelf_item = shelf_item_id(&pool, user).await;
        let a = upsert_catalog_item(pool.write(), &book("od-a", "A")).await.unwrap();
        let b = upsert_catalog_item(pool.write(), &book("od-b", "B")).await.unwrap();

        for (catalog_item, method) in [(a.id, MatchMethod::Fuzzy), (b.id, MatchMethod::Isbn)] {
            upsert_match(pool.write(), match_record(user, shelf_item, catalog_item, method))
                .await
                .unwrap();
        }

        let matches = CatalogMatchEntity::find()
            .filter(CatalogMatchColumn::ShelfItemId.eq(shelf_item))
            .all(pool.read())
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].catalog_item_id, b.id);
        assert_eq!(matches[0].match_method(), MatchMethod::Isbn);
    }

    #[tokio::test]
    async fn test_match_insert_race_becomes_update() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let shelf_item = shelf_item_id(&pool, user).await;
        let a = upsert_catalog_item(pool.write(), &book("od-a", "A")).await.unwrap();
        let b = upsert_catalog_item(pool.write(), &book("od-b", "B")).await.unwrap();

        let first = match_record(user, shelf_item, a.id, MatchMethod::Fuzzy);
        let first = upsert_match(pool.write(), first).await.unwrap();

        // Second writer looked before the first one committed
        let txn = pool.begin().await.unwrap();
        let second = match_record(user, shelf_item, b.id, MatchMethod::Isbn);
        let second = write_match(&txn, None, &second).await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.catalog_item_id, b.id);
        assert_eq!(CatalogMatchEntity::find().count(pool.read()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_insert_race_reports_winner_status() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let item = upsert_catalog_item(pool.write(), &book("od-s", "S")).await.unwrap();

        let hold = ProviderAvailability {
            status: AvailabilityStatus::Hold,
            ..ProviderAvailability::not_owned("fixture", "od-s", Format::Ebook)
        };
        upsert_availability_snapshot(pool.write(), user, item.id, &hold, Utc::now())
            .await
            .unwrap();

        let available = ProviderAvailability {
            status: AvailabilityStatus::Available,
            ..hold.clone()
        };
        let key = SnapshotKey {
            user_id: user,
            catalog_item_id: item.id,
            availability: &available,
            checked_at: Utc::now(),
        };
        let write = write_snapshot(pool.write(), None, &key).await.unwrap();

        assert_eq!(write.previous, Some(AvailabilityStatus::Hold));
        assert_eq!(write.snapshot.availability_status(), AvailabilityStatus::Available);
        assert_eq!(AvailabilitySnapshotEntity::find().count(pool.read()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_external_id_is_unique_per_user_and_source() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let source = Some(Uuid::new_v4());
        let dune = [entry(Some("gr-1"), "Dune", "Frank Herbert", None)];
        upsert_shelf_items(pool.write(), user, source, &dune).await.unwrap();

        let existing = ShelfItemEntity::find().one(pool.read()).await.unwrap().unwrap();
        let mut duplicate = ShelfItemActiveModel::from(existing).reset_all();
        duplicate.id = Set(Uuid::new_v4());
        duplicate.identity_key = Set("title:emma|author:jane austen".to_string());
        let err = duplicate.insert(pool.write()).await.unwrap_err();

        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_snapshot_upsert_reports_previous_status() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let item = upsert_catalog_item(pool.write(), &book("od-s", "S")).await.unwrap();

        let mut availability = ProviderAvailability::not_owned("fixture", "od-s", Format::Ebook);
        let first =
            upsert_availability_snapshot(pool.write(), user, item.id, &availability, Utc::now())
                .await
                .unwrap();
        assert_eq!(first.previous, None);

        availability.status = AvailabilityStatus::Available;
        let second =
            upsert_availability_snapshot(pool.write(), user, item.id, &availability, Utc::now())
                .await
                .unwrap();
        assert_eq!(second.previous, Some(AvailabilityStatus::NotOwned));
        assert_eq!(second.snapshot.id, first.snapshot.id);
        assert_eq!(second.snapshot.availability_status(), AvailabilityStatus::Available);
    }
}
