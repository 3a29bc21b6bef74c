//! Schema bootstrap from the entity definitions

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, EntityTrait, Schema};

/// Create every table and natural-key index that does not exist yet
pub async fn create_schema<C: ConnectionTrait>(conn: &C) -> Result<()> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let tables = [
        schema.create_table_from_entity(CatalogItemEntity).if_not_exists().to_owned(),
        schema.create_table_from_entity(ShelfItemEntity).if_not_exists().to_owned(),
        schema.create_table_from_entity(CatalogMatchEntity).if_not_exists().to_owned(),
        schema.create_table_from_entity(AvailabilitySnapshotEntity).if_not_exists().to_owned(),
        schema.create_table_from_entity(NotificationEventEntity).if_not_exists().to_owned(),
        schema.create_table_from_entity(SyncRunEntity).if_not_exists().to_owned(),
        schema.create_table_from_entity(UserSettingsEntity).if_not_exists().to_owned(),
    ];

    for table in &tables {
        conn.execute(backend.build(table)).await?;
    }

    for index in indexes() {
        conn.execute(backend.build(&index)).await?;
    }

    Ok(())
}

fn unique_index<E: EntityTrait>(
    name: &str,
    entity: E,
    columns: &[E::Column],
) -> IndexCreateStatement {
    let mut index = Index::create();
    index.name(name).table(entity).unique().if_not_exists();
    for column in columns {
        index.col(*column);
    }
    index.to_owned()
}

fn indexes() -> Vec<IndexCreateStatement> {
    vec![
        unique_index(
            "ux_catalog_items_provider_item",
            CatalogItemEntity,
            &[CatalogItemColumn::Provider, CatalogItemColumn::ProviderItemId],
        ),
        unique_index(
            "ux_shelf_items_user_source_external",
            ShelfItemEntity,
            &[ShelfItemColumn::UserId, ShelfItemColumn::SourceId, ShelfItemColumn::ExternalId],
        ),
        unique_index(
            "ux_catalog_matches_user_shelf_item",
            CatalogMatchEntity,
            &[CatalogMatchColumn::UserId, CatalogMatchColumn::ShelfItemId],
        ),
        unique_index(
            "ux_availability_snapshots_user_item_format",
            AvailabilitySnapshotEntity,
            &[
                AvailabilitySnapshotColumn::UserId,
                AvailabilitySnapshotColumn::CatalogItemId,
                AvailabilitySnapshotColumn::Format,
            ],
        ),
        Index::create()
            .name("ix_shelf_items_user_identity")
            .table(ShelfItemEntity)
            .col(ShelfItemColumn::UserId)
            .col(ShelfItemColumn::IdentityKey)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_notification_events_user_created")
            .table(NotificationEventEntity)
            .col(NotificationEventColumn::UserId)
            .col(NotificationEventColumn::CreatedAt)
            .if_not_exists()
            .to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use crate::db::DbPool;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = DbPool::connect_in_memory().await.unwrap();
        super::create_schema(pool.write()).await.unwrap();
        pool.ping().await.unwrap();
    }
}
