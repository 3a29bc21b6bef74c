//! ShelfSync Common Library
//!
//! Shared code for the ShelfSync workers including:
//! - Database entities, schema bootstrap, upserts and repository
//! - Catalog provider abstraction
//! - Identity normalization
//! - Availability cache backends and live event publishers
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod normalize;
pub mod queue;
pub mod telemetry;

// Re-export commonly used types
pub use catalog::CatalogProvider;
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
