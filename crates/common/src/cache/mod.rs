//! Key/value cache backends with TTL
//!
//! Provides:
//! - Redis backend with pipelined multi-get / multi-set
//! - In-process backend for tests and single-node runs
//! - Key builders for cached availability

use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, Client};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// String cache with per-entry TTL
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch many keys at once; the result is positionally aligned with `keys`
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Store many entries with one TTL
    async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()>;

    /// Backend name used in logs and metrics
    fn name(&self) -> &str;
}

/// Redis cache client
pub struct RedisCache {
    connection: RwLock<MultiplexedConnection>,
    key_prefix: String,
}

impl RedisCache {
    /// Create a new cache client
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| AppError::Configuration {
            message: "redis.url is required for the redis cache".to_string(),
        })?;

        let client = Client::open(url).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self::with_connection(connection, &config.key_prefix))
    }

    /// Wrap an existing connection
    pub fn with_connection(connection: MultiplexedConnection, key_prefix: &str) -> Self {
        Self {
            connection: RwLock::new(connection),
            key_prefix: key_prefix.to_string(),
        }
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.write().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(self.key(key));
        }

        let mut conn = self.connection.write().await;
        let values: Vec<Option<String>> = pipe
            .query_async(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to get {} keys: {}", keys.len(), e),
            })?;

        debug!(requested = keys.len(), "Cache multi-get");
        Ok(values)
    }

    async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(self.key(key), value, ttl.as_secs().max(1)).ignore();
        }

        let mut conn = self.connection.write().await;
        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set {} keys: {}", entries.len(), e),
            })?;

        debug!(count = entries.len(), ttl_secs = ttl.as_secs(), "Cache multi-set");
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}

/// In-process cache with lazy expiry
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Store a raw value, bypassing serialization
    pub async fn insert_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|(_, expires_at)| *expires_at > now)
                    .map(|(value, _)| value.clone())
            })
            .collect())
    }

    async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        let mut map = self.entries.write().await;
        map.retain(|_, (_, exp)| *exp > Instant::now());
        for (key, value) in entries {
            map.insert(key.clone(), (value.clone(), expires_at));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Cache key builder helpers
pub mod keys {
    /// Cached availability of one format of one provider item
    pub fn availability(
        provider: &str,
        library_system: &str,
        provider_item_id: &str,
        format: &str,
    ) -> String {
        format!(
            "availability:{}:{}:{}:{}",
            provider, library_system, provider_item_id, format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(
            keys::availability("fixture", "lapl", "od-1", "ebook"),
            "availability:fixture:lapl:od-1:ebook"
        );
    }

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        cache
            .set_many(&[("a".to_string(), "1".to_string())], Duration::from_secs(60))
            .await
            .unwrap();

        let values = cache.get_many(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None]);
    }

    #[tokio::test]
    async fn test_memory_cache_expires_entries() {
        let cache = MemoryCache::new();
        cache.insert_raw("gone", "x", Duration::ZERO).await;

        let values = cache.get_many(&["gone".to_string()]).await.unwrap();
        assert_eq!(values, vec![None]);
    }
}
