//! Deterministic catalog backed by a JSON document
//!
//! ```json
//! {"items": [{"provider_item_id": "od-1", "title": "Dune", "author": "Frank Herbert",
//!             "isbn13": "9780441172719",
//!             "formats": {"ebook": {"status": "available", "copies_available": 2}}}]}
//! ```

use super::types::{AvailabilityStatus, Format, ProviderAvailability, ProviderBook, SearchQuery};
use super::CatalogProvider;
use crate::errors::{AppError, Result};
use crate::normalize::{normalize_isbn, normalize_text};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const PROVIDER_NAME: &str = "fixture";

#[derive(Debug, Deserialize)]
struct FixtureDocument {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureItem {
    provider_item_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    isbn10: Option<String>,
    #[serde(default)]
    isbn13: Option<String>,
    #[serde(default)]
    asin: Option<String>,
    #[serde(default)]
    formats: BTreeMap<String, FixtureFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureFormat {
    status: String,
    #[serde(default)]
    copies_available: Option<i32>,
    #[serde(default)]
    copies_total: Option<i32>,
    #[serde(default)]
    holds: Option<i32>,
    #[serde(default)]
    deep_link: Option<String>,
}

#[derive(Debug, Clone)]
struct Entry {
    item: FixtureItem,
    raw: serde_json::Value,
    norm_title: String,
    norm_author: String,
    isbn10: Option<String>,
    isbn13: Option<String>,
}

/// Catalog provider serving a fixed JSON catalog
#[derive(Debug, Clone)]
pub struct FixtureProvider {
    entries: Vec<Entry>,
}

impl FixtureProvider {
    /// Load the catalog from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
            message: format!("Fixture file {} unreadable: {}", path.display(), e),
        })?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        Self::from_value(value)
    }

    /// Build the catalog from an in-memory JSON document
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let document: FixtureDocument = serde_json::from_value(value)?;

        let mut entries = Vec::with_capacity(document.items.len());
        for raw in document.items {
            let item: FixtureItem = serde_json::from_value(raw.clone())?;

            for (key, payload) in &item.formats {
                if Format::parse(key).is_none() {
                    return Err(AppError::InvalidFormat {
                        message: format!(
                            "Unknown format '{}' on fixture item {}",
                            key, item.provider_item_id
                        ),
                    });
                }
                let known = matches!(
                    payload.status.as_str(),
                    "available" | "hold" | "not_owned" | "unknown"
                );
                if !known {
                    return Err(AppError::InvalidFormat {
                        message: format!(
                            "Unknown status '{}' on fixture item {}",
                            payload.status, item.provider_item_id
                        ),
                    });
                }
            }

            entries.push(Entry {
                norm_title: normalize_text(&item.title),
                norm_author: normalize_text(item.author.as_deref().unwrap_or("")),
                isbn10: item.isbn10.as_deref().and_then(normalize_isbn),
                isbn13: item.isbn13.as_deref().and_then(normalize_isbn),
                item,
                raw,
            });
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_book(entry: &Entry) -> ProviderBook {
        ProviderBook {
            provider: PROVIDER_NAME.to_string(),
            provider_item_id: entry.item.provider_item_id.clone(),
            title: entry.item.title.clone(),
            author: entry.item.author.clone(),
            isbn10: entry.item.isbn10.clone(),
            isbn13: entry.item.isbn13.clone(),
            asin: entry.item.asin.clone(),
            raw: entry.raw.clone(),
        }
    }
}

#[async_trait]
impl CatalogProvider for FixtureProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProviderBook>> {
        let q_title = normalize_text(query.title.as_deref().unwrap_or(""));
        let q_author = normalize_text(query.author.as_deref().unwrap_or(""));
        let q_isbn10 = query.isbn10.as_deref().and_then(normalize_isbn);
        let q_isbn13 = query.isbn13.as_deref().and_then(normalize_isbn);

        let mut out = Vec::new();
        for entry in &self.entries {
            if out.len() >= query.limit {
                break;
            }

            let isbn_hit = (q_isbn13.is_some() && entry.isbn13 == q_isbn13)
                || (q_isbn10.is_some() && entry.isbn10 == q_isbn10);
            if isbn_hit {
                out.push(Self::to_book(entry));
                continue;
            }

            if !q_title.is_empty() && !entry.norm_title.contains(&q_title) {
                continue;
            }
            // Author only narrows queries that carry no title
            if q_title.is_empty()
                && !q_author.is_empty()
                && !entry.norm_author.contains(&q_author)
            {
                continue;
            }

            out.push(Self::to_book(entry));
        }

        Ok(out)
    }

    async fn availability_bulk(
        &self,
        provider_item_ids: &[String],
    ) -> Result<Vec<ProviderAvailability>> {
        let wanted: HashSet<&str> = provider_item_ids.iter().map(String::as_str).collect();

        let mut out = Vec::new();
        for entry in &self.entries {
            if !wanted.contains(entry.item.provider_item_id.as_str()) {
                continue;
            }
            for (key, payload) in &entry.item.formats {
                // Validated at load
                let Some(format) = Format::parse(key) else { continue };
                out.push(ProviderAvailability {
                    provider: PROVIDER_NAME.to_string(),
                    provider_item_id: entry.item.provider_item_id.clone(),
                    format,
                    status: AvailabilityStatus::from(payload.status.as_str()),
                    copies_available: payload.copies_available,
                    copies_total: payload.copies_total,
                    holds: payload.holds,
                    deep_link: payload.deep_link.clone(),
                });
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> FixtureProvider {
        FixtureProvider::from_value(json!({
            "items": [
                {
                    "provider_item_id": "od-phm",
                    "title": "Project Hail Mary",
                    "author": "Andy Weir",
                    "isbn13": "978-0593135204",
                    "formats": {
                        "ebook": {"status": "available", "copies_available": 1, "copies_total": 3},
                        "audiobook": {"status": "hold", "holds": 12}
                    }
                },
                {
                    "provider_item_id": "od-hobbit",
                    "title": "The Hobbit",
                    "author": "J.R.R. Tolkien",
                    "isbn10": "0261102214",
                    "formats": {"ebook": {"status": "not_owned"}}
                },
                {
                    "provider_item_id": "od-martian",
                    "title": "The Martian",
                    "author": "Andy Weir",
                    "formats": {}
                }
            ]
        }))
        .unwrap()
    }

    fn query(title: Option<&str>, author: Option<&str>, isbn13: Option<&str>) -> SearchQuery {
        SearchQuery {
            title: title.map(str::to_string),
            author: author.map(str::to_string),
            isbn10: None,
            isbn13: isbn13.map(str::to_string),
            limit: 10,
        }
    }

    #[tokio::test]
    async fn test_isbn_search_ignores_title() {
        let results = provider()
            .search(&query(Some("something else"), None, Some("9780593135204")))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].provider_item_id, "od-phm");
        assert_eq!(results[0].provider, "fixture");
    }

    #[tokio::test]
    async fn test_title_substring_search() {
        let results = provider().search(&query(Some("the"), Some("Nobody"), None)).await.unwrap();
        let ids: Vec<_> = results.iter().map(|b| b.provider_item_id.as_str()).collect();
        assert_eq!(ids, vec!["od-hobbit", "od-martian"]);
    }

    #[tokio::test]
    async fn test_author_only_search_filters() {
        let results = provider().search(&query(None, Some("andy weir"), None)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|b| b.author.as_deref() == Some("Andy Weir")));
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let mut q = query(None, None, None);
        q.limit = 1;
        assert_eq!(provider().search(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_availability_bulk_reports_listed_formats() {
        let results = provider()
            .availability_bulk(&["od-phm".to_string(), "od-missing".to_string()])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        let ebook = results.iter().find(|a| a.format == Format::Ebook).unwrap();
        assert_eq!(ebook.status, AvailabilityStatus::Available);
        assert_eq!(ebook.copies_total, Some(3));
        let audio = results.iter().find(|a| a.format == Format::Audiobook).unwrap();
        assert_eq!(audio.status, AvailabilityStatus::Hold);
        assert_eq!(audio.holds, Some(12));
    }

    #[test]
    fn test_unknown_format_rejected_at_load() {
        let result = FixtureProvider::from_value(json!({
            "items": [{
                "provider_item_id": "x",
                "title": "X",
                "formats": {"vinyl": {"status": "available"}}
            }]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = FixtureProvider::from_path("/nonexistent/catalog.json").unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_bundled_fixture_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/catalog_fixture.json");
        let provider = FixtureProvider::from_path(path).unwrap();
        assert_eq!(provider.len(), 5);

        let results = provider
            .search(&SearchQuery {
                isbn13: Some("978-0-441-17271-9".to_string()),
                limit: 10,
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(results[0].provider_item_id, "od-dune");
    }
}
