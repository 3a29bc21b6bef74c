//! SQS Queue integration for async job processing
//!
//! Provides:
//! - SQS client wrapper with retrying submission
//! - Message serialization/deserialization
//! - Job message types for shelf imports and sync runs

use crate::config::QueueConfig as AppQueueConfig;
use crate::db::upsert::ShelfEntry;
use crate::errors::{AppError, Result};
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client as SqsClient;
use backoff::{future::retry, ExponentialBackoff};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// SQS queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue URL
    pub url: String,
    /// Visibility timeout in seconds
    pub visibility_timeout: i32,
    /// Wait time for long polling (seconds)
    pub wait_time_seconds: i32,
    /// Maximum number of messages per poll
    pub max_messages: i32,
    /// Attempts made by `send` before giving up
    pub submit_max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            visibility_timeout: 30,
            wait_time_seconds: 20,
            max_messages: 10,
            submit_max_attempts: 3,
        }
    }
}

impl QueueConfig {
    /// Settings for one queue URL taken from the application config
    pub fn from_app(config: &AppQueueConfig, url: &str) -> Self {
        Self {
            url: url.to_string(),
            visibility_timeout: config.visibility_timeout_secs as i32,
            wait_time_seconds: config.poll_timeout_secs.min(20) as i32,
            max_messages: config.batch_size.clamp(1, 10) as i32,
            submit_max_attempts: config.submit_max_attempts.max(1),
        }
    }
}

/// SQS Queue client wrapper
pub struct Queue {
    client: SqsClient,
    config: QueueConfig,
}

impl Queue {
    /// Create a new queue client
    pub async fn new(config: QueueConfig) -> Result<Self> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = SqsClient::new(&aws_config);

        Ok(Self { client, config })
    }

    /// Visibility timeout applied to received messages, in seconds
    pub fn visibility_timeout(&self) -> i32 {
        self.config.visibility_timeout
    }

    /// Send a message, retrying transient failures with exponential backoff
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<String> {
        let body = serde_json::to_string(message).map_err(|e| AppError::QueueError {
            message: format!("Failed to serialize message: {}", e),
        })?;

        let attempts = AtomicU32::new(0);
        let max_attempts = self.config.submit_max_attempts;
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..ExponentialBackoff::default()
        };

        let message_id = retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let request = self
                .client
                .send_message()
                .queue_url(&self.config.url)
                .message_body(&body);

            async move {
                match request.send().await {
                    Ok(output) => Ok(output.message_id.unwrap_or_default()),
                    Err(e) if attempt < max_attempts => {
                        warn!(
                            attempt,
                            max_attempts,
                            error = %e,
                            "Queue submission failed, retrying"
                        );
                        Err(backoff::Error::transient(AppError::QueueError {
                            message: format!("Failed to send message: {}", e),
                        }))
                    }
                    Err(e) => Err(backoff::Error::permanent(AppError::QueueError {
                        message: format!(
                            "Failed to send message after {} attempts: {}",
                            attempt, e
                        ),
                    })),
                }
            }
        })
        .await?;

        debug!(message_id = %message_id, "Message sent to queue");
        Ok(message_id)
    }

    /// Receive messages from the queue
    pub async fn receive(&self) -> Result<Vec<Message>> {
        let result = self
            .client
            .receive_message()
            .queue_url(&self.config.url)
            .max_number_of_messages(self.config.max_messages)
            .visibility_timeout(self.config.visibility_timeout)
            .wait_time_seconds(self.config.wait_time_seconds)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to receive messages: {}", e),
            })?;

        let messages = result.messages.unwrap_or_default();
        debug!(count = messages.len(), "Received messages from queue");

        Ok(messages)
    }

    /// Receive and decode messages, returning each with its receipt handle.
    ///
    /// Undecodable messages are logged and left for redrive to the DLQ.
    pub async fn receive_jobs<T: DeserializeOwned>(&self) -> Result<Vec<(T, String)>> {
        let messages = self.receive().await?;
        let mut jobs = Vec::with_capacity(messages.len());

        for message in messages {
            let Some(receipt) = message.receipt_handle.clone() else {
                continue;
            };
            match Self::parse_message::<T>(&message) {
                Ok(job) => jobs.push((job, receipt)),
                Err(e) => warn!(
                    message_id = message.message_id.as_deref().unwrap_or("?"),
                    error = %e,
                    "Dropping undecodable message"
                ),
            }
        }

        Ok(jobs)
    }

    /// Delete a message after processing
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.config.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!("Message deleted from queue");
        Ok(())
    }

    /// Reset the visibility timeout of a message still being processed
    pub async fn extend_visibility(&self, receipt_handle: &str, seconds: i32) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.config.url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(seconds)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to extend visibility: {}", e),
            })?;

        debug!(seconds, "Extended message visibility");
        Ok(())
    }

    /// Parse message body as JSON
    pub fn parse_message<T: DeserializeOwned>(message: &Message) -> Result<T> {
        let body = message.body.as_ref().ok_or_else(|| AppError::QueueError {
            message: "Message has no body".to_string(),
        })?;

        serde_json::from_str(body).map_err(|e| AppError::QueueError {
            message: format!("Failed to parse message: {}", e),
        })
    }
}

/// Request to execute one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunJobMessage {
    pub sync_run_id: Uuid,
}

/// Normalized shelf export to apply for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelfImportJobMessage {
    pub job_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub source_id: Option<Uuid>,
    pub items: Vec<ShelfEntry>,
    /// Submit an availability refresh once the import changed something
    #[serde(default)]
    pub refresh_after_import: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_message_defaults() {
        let parsed: ShelfImportJobMessage = serde_json::from_str(
            r#"{
                "job_id": "6f1c1d52-3e39-4b4c-9d0a-9a1f4f0d2e11",
                "user_id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
                "items": [{"title": "Dune", "author": "Frank Herbert"}]
            }"#,
        )
        .unwrap();

        assert!(parsed.source_id.is_none());
        assert!(!parsed.refresh_after_import);
        assert_eq!(parsed.items[0].title.as_deref(), Some("Dune"));
        assert!(parsed.items[0].isbn13.is_none());
    }

    #[test]
    fn test_parse_message_requires_body() {
        let message = Message::builder().message_id("m-1").build();
        assert!(Queue::parse_message::<SyncRunJobMessage>(&message).is_err());

        let message = Message::builder()
            .body(r#"{"sync_run_id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427"}"#)
            .build();
        let job: SyncRunJobMessage = Queue::parse_message(&message).unwrap();
        assert_eq!(job.sync_run_id.to_string(), "1b4e28ba-2fa1-11d2-883f-0016d3cca427");
    }

    #[test]
    fn test_queue_config_from_app_clamps_limits() {
        let app = AppQueueConfig {
            batch_size: 50,
            poll_timeout_secs: 60,
            submit_max_attempts: 0,
            ..AppQueueConfig::default()
        };
        let config = QueueConfig::from_app(&app, "https://sqs.example/sync");
        assert_eq!(config.max_messages, 10);
        assert_eq!(config.wait_time_seconds, 20);
        assert_eq!(config.submit_max_attempts, 1);
    }
}
