//! ShelfSync Sync Worker
//!
//! Processes sync run jobs from SQS queue:
//! 1. Receives a sync run id from the queue
//! 2. Matches the user's shelf items to the catalog
//! 3. Refreshes availability through the cache
//! 4. Persists snapshots and notifications, publishing live events

mod availability;
mod errors;
mod matcher;
mod notifier;
mod processor;

use crate::errors::SyncError;
use crate::processor::{ProcessorConfig, SyncRunOutcome, SyncRunProcessor};
use metrics_exporter_prometheus::PrometheusBuilder;
use shelfsync_common::{
    cache::{CacheBackend, MemoryCache, RedisCache},
    catalog::create_provider,
    config::AppConfig,
    db::DbPool,
    events::create_publisher,
    metrics::{record_queue_message, register_metrics},
    queue::{Queue, QueueConfig, SyncRunJobMessage},
    telemetry::init_tracing,
    VERSION,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const QUEUE_NAME: &str = "sync";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    init_tracing(&config.observability);
    info!("Starting ShelfSync Sync Worker v{}", VERSION);

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
        .install()?;
    register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    let provider = create_provider(&config.catalog)?;
    info!(provider = provider.name(), "Catalog provider initialized");

    let cache: Arc<dyn CacheBackend> = match config.redis.url {
        Some(_) => {
            let redis = RedisCache::new(&config.redis).await?;
            redis.ping().await?;
            info!("Redis availability cache connected");
            Arc::new(redis)
        }
        None => {
            warn!("redis.url not set, using in-process availability cache");
            Arc::new(MemoryCache::new())
        }
    };
    let publisher = create_publisher(&config.redis).await?;

    let processor = SyncRunProcessor::new(
        db,
        provider,
        Some(cache),
        publisher,
        ProcessorConfig::from_app(&config),
    );

    // Check for command line arguments for a one-off run
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 && args[1] == "run" {
        let run_id = args[2].parse::<uuid::Uuid>()?;
        let outcome = processor.run_with_timeout(run_id, config.job_timeout()).await?;
        println!("{:?}", outcome);
        return Ok(());
    }

    let sync_queue = match config.queue.sync_queue_url.as_deref() {
        Some(url) => {
            info!(url = %url, "Connecting to sync queue...");
            Queue::new(QueueConfig::from_app(&config.queue, url)).await?
        }
        None => {
            warn!("queue.sync_queue_url not set, waiting for shutdown signal...");
            tokio::signal::ctrl_c().await?;
            info!("Sync worker shutting down");
            return Ok(());
        }
    };

    info!("Sync worker ready, starting queue polling...");

    // Circuit breaker state
    let mut consecutive_failures = 0;
    let max_failures = config.worker.max_consecutive_failures.max(1);
    let circuit_break = Duration::from_secs(config.worker.circuit_break_secs);

    loop {
        if consecutive_failures >= max_failures {
            warn!(failures = consecutive_failures, "Circuit breaker open, pausing...");
            tokio::time::sleep(circuit_break).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            result = sync_queue.receive_jobs::<SyncRunJobMessage>() => {
                match result {
                    Ok(jobs) => {
                        for (job, receipt_handle) in jobs {
                            let run_id = job.sync_run_id;
                            info!(sync_run_id = %run_id, "Received sync run job");

                            let work = processor.run_with_timeout(run_id, config.job_timeout());
                            let result = hold_message(&sync_queue, &receipt_handle, work).await;

                            match result {
                                Ok(outcome) => {
                                    consecutive_failures = 0;
                                    if let SyncRunOutcome::Failed { message } = &outcome {
                                        warn!(
                                            sync_run_id = %run_id,
                                            message = %message,
                                            "Sync run failed"
                                        );
                                    }
                                    record_queue_message(QUEUE_NAME, true);
                                    if let Err(e) = sync_queue.delete(&receipt_handle).await {
                                        error!(error = %e, "Failed to delete message");
                                    }
                                }
                                Err(SyncError::RunInProgress(id)) => {
                                    // Redelivered mid-run; retried once the lease lapses
                                    info!(sync_run_id = %id, "Sync run held elsewhere");
                                }
                                Err(SyncError::RunNotFound(id)) => {
                                    // May not be visible yet; redelivery or the DLQ settles it
                                    warn!(sync_run_id = %id, "Sync run not found, leaving message");
                                    record_queue_message(QUEUE_NAME, false);
                                }
                                Err(e) => {
                                    consecutive_failures += 1;
                                    record_queue_message(QUEUE_NAME, false);
                                    error!(
                                        sync_run_id = %run_id,
                                        error = %e,
                                        failures = consecutive_failures,
                                        "Failed to process sync run job"
                                    );
                                    // Message will be re-delivered or moved to DLQ
                                }
                            }
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(error = %e, "Failed to receive messages from queue");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    info!("Sync worker shutting down");
    Ok(())
}

/// Drive `work` while keeping its message invisible to other consumers
async fn hold_message<F, T>(queue: &Queue, receipt_handle: &str, work: F) -> T
where
    F: Future<Output = T>,
{
    let visibility = queue.visibility_timeout().max(2);
    let period = Duration::from_secs((visibility / 2) as u64);
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    tokio::pin!(work);
    loop {
        tokio::select! {
            result = &mut work => return result,
            _ = heartbeat.tick() => {
                match queue.extend_visibility(receipt_handle, visibility).await {
                    Ok(()) => debug!(visibility_secs = visibility, "Message visibility extended"),
                    Err(e) => warn!(error = %e, "Failed to extend message visibility"),
                }
            }
        }
    }
}
