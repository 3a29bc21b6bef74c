//! Catalog item entity: a provider record shared by all users

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "catalog_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub provider: String,

    #[sea_orm(column_type = "Text")]
    pub provider_item_id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub author: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub isbn10: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub isbn13: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub asin: Option<String>,

    /// Provider payload as returned by search
    pub raw: Json,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::catalog_match::Entity")]
    CatalogMatch,

    #[sea_orm(has_many = "super::availability_snapshot::Entity")]
    AvailabilitySnapshot,
}

impl Related<super::catalog_match::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CatalogMatch.def()
    }
}

impl Related<super::availability_snapshot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AvailabilitySnapshot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
