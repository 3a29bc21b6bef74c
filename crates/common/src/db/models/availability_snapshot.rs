//! Availability snapshot entity: latest known status per (user, item, format)

use crate::catalog::AvailabilityStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "availability_snapshots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub catalog_item_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub format: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub copies_available: Option<i32>,

    pub copies_total: Option<i32>,

    pub holds: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub deep_link: Option<String>,

    pub last_checked_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn availability_status(&self) -> AvailabilityStatus {
        AvailabilityStatus::from(self.status.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::catalog_item::Entity",
        from = "Column::CatalogItemId",
        to = "super::catalog_item::Column::Id"
    )]
    CatalogItem,
}

impl Related<super::catalog_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CatalogItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
