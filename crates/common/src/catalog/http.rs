//! Generic JSON-over-HTTP catalog integration
//!
//! - `GET {base}/search?title=..&author=..&isbn10=..&isbn13=..&limit=..`
//!   returns `{"items": [ProviderBook]}`
//! - `POST {base}/availability` with `{"provider_item_ids": [..]}`
//!   returns `{"items": [ProviderAvailability]}`

use super::types::{ProviderAvailability, ProviderBook, SearchQuery};
use super::CatalogProvider;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PROVIDER_NAME: &str = "http";

#[derive(Deserialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

#[derive(Serialize)]
struct AvailabilityRequest<'a> {
    provider_item_ids: &'a [String],
}

/// Catalog provider speaking the generic JSON protocol
pub struct HttpCatalogProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

impl HttpCatalogProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn search_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(title) = &query.title {
            params.push(("title", title.clone()));
        }
        if let Some(author) = &query.author {
            params.push(("author", author.clone()));
        }
        if let Some(isbn10) = &query.isbn10 {
            params.push(("isbn10", isbn10.clone()));
        }
        if let Some(isbn13) = &query.isbn13 {
            params.push(("isbn13", isbn13.clone()));
        }
        params.push(("limit", query.limit.to_string()));
        params
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send a request, retrying transient failures with exponential backoff
    async fn send_with_retry<T, F>(&self, operation: &'static str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let attempts = AtomicU32::new(0);
        let start = Instant::now();
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.timeout * (self.max_retries + 1)),
            ..ExponentialBackoff::default()
        };

        let result = retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let request = build();
            async move { self.classify(operation, attempt, self.send_once::<T>(request).await) }
        })
        .await;

        let elapsed = start.elapsed().as_secs_f64();
        metrics::record_provider_call(PROVIDER_NAME, operation, elapsed, result.is_ok());
        result
    }

    fn classify<T>(
        &self,
        operation: &'static str,
        attempt: u32,
        result: Result<T>,
    ) -> std::result::Result<T, backoff::Error<AppError>> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() && attempt <= self.max_retries => {
                warn!(
                    operation,
                    attempt,
                    max_retries = self.max_retries,
                    error = %e,
                    "Catalog request failed, retrying"
                );
                Err(backoff::Error::transient(e))
            }
            Err(e) => Err(backoff::Error::permanent(e)),
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::ProviderTimeout {
                    provider: PROVIDER_NAME.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                AppError::HttpClient(e)
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Retryable statuses keep the reqwest error so `is_transient` sees them
            response.error_for_status_ref().map_err(AppError::HttpClient)?;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider {
                provider: PROVIDER_NAME.to_string(),
                message: format!("API error {}: {}", status, body),
            });
        }

        response.json::<T>().await.map_err(|e| AppError::Provider {
            provider: PROVIDER_NAME.to_string(),
            message: format!("Failed to parse response: {}", e),
        })
    }
}

#[async_trait]
impl CatalogProvider for HttpCatalogProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProviderBook>> {
        let url = self.url("search");
        let params = Self::search_params(query);

        let response: ItemsResponse<ProviderBook> = self
            .send_with_retry("search", || self.client.get(&url).query(&params))
            .await?;

        debug!(count = response.items.len(), "Catalog search completed");
        let mut items = response.items;
        items.truncate(query.limit);
        for item in &mut items {
            item.provider = PROVIDER_NAME.to_string();
        }
        Ok(items)
    }

    async fn availability_bulk(
        &self,
        provider_item_ids: &[String],
    ) -> Result<Vec<ProviderAvailability>> {
        if provider_item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.url("availability");
        let body = AvailabilityRequest { provider_item_ids };

        let response: ItemsResponse<ProviderAvailability> = self
            .send_with_retry("availability", || self.client.post(&url).json(&body))
            .await?;

        debug!(
            requested = provider_item_ids.len(),
            returned = response.items.len(),
            "Catalog availability completed"
        );
        let mut items = response.items;
        for item in &mut items {
            item.provider = PROVIDER_NAME.to_string();
        }
        Ok(items)
    }
}
