//! Catalog provider abstraction
//!
//! Providers expose two capabilities: searching for candidate records and
//! bulk availability lookup. Implementations:
//! - Fixture (deterministic JSON catalog, used for tests and local runs)
//! - HTTP (live JSON integration)

mod fixture;
mod http;
mod types;

pub use fixture::FixtureProvider;
pub use http::HttpCatalogProvider;
pub use types::{AvailabilityStatus, Format, ProviderAvailability, ProviderBook, SearchQuery};

use crate::config::CatalogConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Capability interface over an external book catalog
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Stable provider name, part of the catalog natural key
    fn name(&self) -> &str;

    /// Return a bounded list of candidate records
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProviderBook>>;

    /// Availability for many items at once
    async fn availability_bulk(
        &self,
        provider_item_ids: &[String],
    ) -> Result<Vec<ProviderAvailability>>;
}

/// Create a provider based on configuration
pub fn create_provider(config: &CatalogConfig) -> Result<Arc<dyn CatalogProvider>> {
    match config.provider.as_str() {
        "fixture" => Ok(Arc::new(FixtureProvider::from_path(&config.fixture_path)?)),
        "http" => {
            let base_url = config.base_url.clone().ok_or_else(|| AppError::Configuration {
                message: "catalog.base_url is required for the http provider".to_string(),
            })?;
            Ok(Arc::new(HttpCatalogProvider::new(
                base_url,
                config.api_key.clone(),
                std::time::Duration::from_secs(config.timeout_secs),
                config.max_retries,
            )?))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown catalog provider: {}", other),
        }),
    }
}
