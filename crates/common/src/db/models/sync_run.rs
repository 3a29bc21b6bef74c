//! Sync run entity for the availability refresh pipeline

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sync run lifecycle: queued -> running -> succeeded | failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Queued => "queued",
            SyncRunStatus::Running => "running",
            SyncRunStatus::Succeeded => "succeeded",
            SyncRunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SyncRunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => SyncRunStatus::Queued,
            "running" => SyncRunStatus::Running,
            "succeeded" => SyncRunStatus::Succeeded,
            "failed" => SyncRunStatus::Failed,
            _ => SyncRunStatus::Queued,
        }
    }
}

impl From<SyncRunStatus> for String {
    fn from(status: SyncRunStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Kind of work a sync run performs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunKind {
    AvailabilityRefresh,
}

impl SyncRunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunKind::AvailabilityRefresh => "availability_refresh",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub kind: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub progress_current: i32,

    pub progress_total: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub started_at: Option<DateTimeWithTimeZone>,

    pub finished_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the run status as an enum
    pub fn run_status(&self) -> SyncRunStatus {
        SyncRunStatus::from(self.status.clone())
    }

    /// Time since the run last recorded a transition or progress
    pub fn idle_for(&self, now: chrono::DateTime<chrono::Utc>) -> std::time::Duration {
        now.signed_duration_since(self.updated_at)
            .to_std()
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
