//! Live event channel
//!
//! Events are JSON objects `{type, payload, ts}` published on per-run and
//! per-user channels. Delivery is best-effort: callers log and drop publish
//! failures.

use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub ts: DateTime<Utc>,
}

impl LiveEvent {
    pub fn new(event_type: &str, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload,
            ts: Utc::now(),
        }
    }
}

/// Channel carrying progress of one sync run
pub fn sync_channel(user_id: Uuid, run_id: Uuid) -> String {
    format!("sync:{}:{}", user_id, run_id)
}

/// Channel carrying notifications of one user
pub fn notify_channel(user_id: Uuid) -> String {
    format!("notify:{}", user_id)
}

/// Publish side of the live event channel
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &LiveEvent) -> Result<()>;
}

/// Redis PUBLISH based publisher
pub struct RedisPublisher {
    connection: RwLock<MultiplexedConnection>,
}

impl RedisPublisher {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| AppError::Configuration {
            message: "redis.url is required for live events".to_string(),
        })?;

        let client = Client::open(url).map_err(|e| AppError::PublishError {
            message: format!("Failed to create Redis client: {}", e),
        })?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::PublishError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection: RwLock::new(connection),
        })
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, channel: &str, event: &LiveEvent) -> Result<()> {
        let body = serde_json::to_string(event)?;
        let mut conn = self.connection.write().await;
        let receivers: i64 = conn.publish(channel, body).await.map_err(|e| AppError::PublishError {
            message: format!("Failed to publish to '{}': {}", channel, e),
        })?;

        debug!(channel, event_type = %event.event_type, receivers, "Live event published");
        Ok(())
    }
}

/// Publisher used when no broker is configured
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, channel: &str, event: &LiveEvent) -> Result<()> {
        debug!(channel, event_type = %event.event_type, "Live events disabled, dropping event");
        Ok(())
    }
}

/// Publisher recording events in memory
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<(String, LiveEvent)>>,
    failing: AtomicBool,
}

impl MemoryPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent publish fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything published so far, in order
    pub fn events(&self) -> Vec<(String, LiveEvent)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events published on one channel
    pub fn events_on(&self, channel: &str) -> Vec<LiveEvent> {
        self.events()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, e)| e)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, channel: &str, event: &LiveEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::PublishError {
                message: "publisher unavailable".to_string(),
            });
        }

        self.events
            .lock()
            .map_err(|_| AppError::Internal {
                message: "event log poisoned".to_string(),
            })?
            .push((channel.to_string(), event.clone()));
        Ok(())
    }
}

/// Redis publisher when configured, otherwise a null publisher
pub async fn create_publisher(config: &RedisConfig) -> Result<Arc<dyn EventPublisher>> {
    match config.url {
        Some(_) => Ok(Arc::new(RedisPublisher::new(config).await?)),
        None => Ok(Arc::new(NullPublisher)),
    }
}
