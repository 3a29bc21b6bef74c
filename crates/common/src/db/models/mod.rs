//! SeaORM entity models
//!
//! Database entities for ShelfSync

mod availability_snapshot;
mod catalog_item;
mod catalog_match;
mod notification_event;
mod shelf_item;
mod sync_run;
mod user_settings;

pub use shelf_item::{
    Entity as ShelfItemEntity,
    Model as ShelfItem,
    ActiveModel as ShelfItemActiveModel,
    Column as ShelfItemColumn,
};

pub use catalog_item::{
    Entity as CatalogItemEntity,
    Model as CatalogItem,
    ActiveModel as CatalogItemActiveModel,
    Column as CatalogItemColumn,
};

pub use catalog_match::{
    Entity as CatalogMatchEntity,
    Model as CatalogMatch,
    ActiveModel as CatalogMatchActiveModel,
    Column as CatalogMatchColumn,
    MatchMethod,
};

pub use availability_snapshot::{
    Entity as AvailabilitySnapshotEntity,
    Model as AvailabilitySnapshot,
    ActiveModel as AvailabilitySnapshotActiveModel,
    Column as AvailabilitySnapshotColumn,
};

pub use sync_run::{
    Entity as SyncRunEntity,
    Model as SyncRun,
    ActiveModel as SyncRunActiveModel,
    Column as SyncRunColumn,
    SyncRunKind,
    SyncRunStatus,
};

pub use notification_event::{
    Entity as NotificationEventEntity,
    Model as NotificationEvent,
    ActiveModel as NotificationEventActiveModel,
    Column as NotificationEventColumn,
};

pub use user_settings::{
    Entity as UserSettingsEntity,
    Model as UserSettings,
    ActiveModel as UserSettingsActiveModel,
    Column as UserSettingsColumn,
};
