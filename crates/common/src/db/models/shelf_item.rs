//! Shelf item entity: one book on a user's reading shelf

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shelf_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub source_id: Option<Uuid>,

    #[sea_orm(column_type = "Text", nullable)]
    pub external_id: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub author: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub isbn10: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub isbn13: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub asin: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub normalized_title: String,

    #[sea_orm(column_type = "Text")]
    pub normalized_author: String,

    #[sea_orm(column_type = "Text")]
    pub identity_key: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub shelf: Option<String>,

    pub needs_fuzzy_match: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::catalog_match::Entity")]
    CatalogMatch,
}

impl Related<super::catalog_match::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CatalogMatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
