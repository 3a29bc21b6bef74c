//! Read-through availability cache
//!
//! Entries are keyed by provider, library system, provider item and format.
//! Misses are fetched from the provider in one bulk call and written back
//! with a TTL. Cache failures degrade to provider calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelfsync_common::cache::{keys, CacheBackend};
use shelfsync_common::catalog::{CatalogProvider, Format, ProviderAvailability};
use shelfsync_common::errors::Result;
use shelfsync_common::metrics;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Availability plus the time it was fetched from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAvailability {
    pub availability: ProviderAvailability,
    pub last_checked_at: DateTime<Utc>,
}

pub type AvailabilityMap = HashMap<(String, Format), CachedAvailability>;

pub struct AvailabilityCache {
    provider: Arc<dyn CatalogProvider>,
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
}

impl AvailabilityCache {
    pub fn new(
        provider: Arc<dyn CatalogProvider>,
        backend: Option<Arc<dyn CacheBackend>>,
        ttl: Duration,
    ) -> Self {
        Self { provider, backend, ttl }
    }

    fn key(&self, library_system: &str, provider_item_id: &str, format: Format) -> String {
        keys::availability(self.provider.name(), library_system, provider_item_id, format.as_str())
    }

    /// Availability for every requested `(provider_item_id, format)` pair
    pub async fn get_availability(
        &self,
        library_system: &str,
        provider_item_ids: &[String],
        formats: &[Format],
    ) -> Result<AvailabilityMap> {
        let ids: BTreeSet<&str> = provider_item_ids.iter().map(String::as_str).collect();
        let wanted: Vec<(&str, Format)> = ids
            .iter()
            .flat_map(|id| formats.iter().map(move |f| (*id, *f)))
            .collect();

        let mut out = AvailabilityMap::with_capacity(wanted.len());
        if wanted.is_empty() {
            return Ok(out);
        }

        let mut missing: BTreeSet<&str> = BTreeSet::new();
        self.read_cached(library_system, &wanted, &mut out, &mut missing).await;

        let hits = out.len();
        let misses = wanted.len() - hits;
        let cache_name = self.backend.as_ref().map_or("none", |b| b.name());
        metrics::record_cache(hits, misses, cache_name);

        if missing.is_empty() {
            debug!(hits, "Availability served from cache");
            return Ok(out);
        }

        let missing_ids: Vec<String> = missing.iter().map(|id| id.to_string()).collect();
        let start = Instant::now();
        let fetched = self.provider.availability_bulk(&missing_ids).await;
        metrics::record_provider_call(
            self.provider.name(),
            "availability",
            start.elapsed().as_secs_f64(),
            fetched.is_ok(),
        );
        let fetched = fetched?;
        let checked_at = Utc::now();

        let mut fresh: Vec<((String, Format), CachedAvailability)> = Vec::new();
        for availability in fetched {
            let requested = missing.contains(availability.provider_item_id.as_str())
                && formats.contains(&availability.format);
            if !requested {
                continue;
            }
            let key = (availability.provider_item_id.clone(), availability.format);
            fresh.push((key, CachedAvailability { availability, last_checked_at: checked_at }));
        }

        for id in &missing {
            for format in formats {
                let pair = (id.to_string(), *format);
                if fresh.iter().any(|(k, _)| *k == pair) {
                    continue;
                }
                let availability =
                    ProviderAvailability::not_owned(self.provider.name(), id, *format);
                fresh.push((
                    pair,
                    CachedAvailability {
                        availability,
                        last_checked_at: checked_at,
                    },
                ));
            }
        }

        self.write_back(library_system, &fresh).await;

        debug!(
            hits,
            misses,
            fetched = fresh.len(),
            "Availability refreshed from provider"
        );

        out.extend(fresh);
        Ok(out)
    }

    async fn read_cached<'a>(
        &self,
        library_system: &str,
        wanted: &[(&'a str, Format)],
        out: &mut AvailabilityMap,
        missing: &mut BTreeSet<&'a str>,
    ) {
        let Some(backend) = &self.backend else {
            missing.extend(wanted.iter().map(|(id, _)| *id));
            return;
        };

        let cache_keys: Vec<String> = wanted
            .iter()
            .map(|(id, format)| self.key(library_system, id, *format))
            .collect();

        let values = match backend.get_many(&cache_keys).await {
            Ok(values) if values.len() == wanted.len() => values,
            Ok(values) => {
                warn!(
                    expected = wanted.len(),
                    got = values.len(),
                    "Cache returned misaligned results"
                );
                vec![None; wanted.len()]
            }
            Err(e) => {
                warn!(
                    error = %e,
                    cache = backend.name(),
                    "Availability cache read failed, using provider"
                );
                vec![None; wanted.len()]
            }
        };

        for ((id, format), raw) in wanted.iter().zip(values) {
            let Some(raw) = raw else {
                missing.insert(id);
                continue;
            };
            match serde_json::from_str::<CachedAvailability>(&raw) {
                Ok(entry) => {
                    out.insert((id.to_string(), *format), entry);
                }
                Err(e) => {
                    warn!(
                        provider_item_id = %id,
                        format = %format,
                        error = %e,
                        "Discarding undecodable cache entry"
                    );
                    missing.insert(id);
                }
            }
        }
    }

    async fn write_back(
        &self,
        library_system: &str,
        fresh: &[((String, Format), CachedAvailability)],
    ) {
        let Some(backend) = &self.backend else {
            return;
        };

        let mut entries = Vec::with_capacity(fresh.len());
        for ((id, format), entry) in fresh {
            match serde_json::to_string(entry) {
                Ok(json) => entries.push((self.key(library_system, id, *format), json)),
                Err(e) => {
                    warn!(provider_item_id = %id, error = %e, "Failed to encode availability")
                }
            }
        }

        if let Err(e) = backend.set_many(&entries, self.ttl).await {
            warn!(error = %e, cache = backend.name(), "Availability cache write failed");
        }
    }
}
