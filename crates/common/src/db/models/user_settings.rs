//! Per-user sync preferences

use crate::catalog::Format;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text", nullable)]
    pub library_system: Option<String>,

    /// JSON array of format names; empty means every format
    pub preferred_formats: Json,

    pub notifications_enabled: bool,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Preferred formats, unknown names dropped
    pub fn formats(&self) -> Vec<Format> {
        let mut formats: Vec<Format> = self
            .preferred_formats
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(Format::parse)
                    .collect()
            })
            .unwrap_or_default();
        formats.sort();
        formats.dedup();
        formats
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
