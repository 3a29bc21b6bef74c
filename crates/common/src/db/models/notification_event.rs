//! Notification event entity: durable record of an availability transition

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub shelf_item_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub format: String,

    #[sea_orm(column_type = "Text")]
    pub old_status: String,

    #[sea_orm(column_type = "Text")]
    pub new_status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub deep_link: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub read_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shelf_item::Entity",
        from = "Column::ShelfItemId",
        to = "super::shelf_item::Column::Id"
    )]
    ShelfItem,
}

impl Related<super::shelf_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShelfItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
