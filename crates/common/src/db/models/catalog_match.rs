//! Catalog match entity: the resolved catalog record for one shelf item

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a match was established
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Isbn,
    Fuzzy,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Isbn => "isbn",
            MatchMethod::Fuzzy => "fuzzy",
        }
    }
}

impl From<String> for MatchMethod {
    fn from(s: String) -> Self {
        match s.as_str() {
            "isbn" => MatchMethod::Isbn,
            _ => MatchMethod::Fuzzy,
        }
    }
}

impl From<MatchMethod> for String {
    fn from(method: MatchMethod) -> Self {
        method.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "catalog_matches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub shelf_item_id: Uuid,

    pub catalog_item_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub provider: String,

    #[sea_orm(column_type = "Text")]
    pub method: String,

    pub confidence: f64,

    pub evidence: Json,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn match_method(&self) -> MatchMethod {
        MatchMethod::from(self.method.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shelf_item::Entity",
        from = "Column::ShelfItemId",
        to = "super::shelf_item::Column::Id"
    )]
    ShelfItem,

    #[sea_orm(
        belongs_to = "super::catalog_item::Entity",
        from = "Column::CatalogItemId",
        to = "super::catalog_item::Column::Id"
    )]
    CatalogItem,
}

impl Related<super::shelf_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShelfItem.def()
    }
}

impl Related<super::catalog_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CatalogItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
