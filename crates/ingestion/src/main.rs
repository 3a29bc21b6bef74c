//! ShelfSync Ingestion Service
//!
//! Processes shelf import jobs from SQS queue:
//! 1. Receives a normalized shelf export
//! 2. Upserts the user's shelf items idempotently
//! 3. Optionally queues an availability refresh run

mod errors;
mod processor;

use crate::processor::ImportProcessor;
use metrics_exporter_prometheus::PrometheusBuilder;
use shelfsync_common::{
    config::AppConfig,
    db::DbPool,
    metrics::{record_queue_message, register_metrics},
    queue::{Queue, QueueConfig, ShelfImportJobMessage},
    telemetry::init_tracing,
    VERSION,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const QUEUE_NAME: &str = "import";

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
    info!("Starting ShelfSync Ingestion Service v{}", VERSION);

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
        .install()?;
    register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    let sync_queue = match config.queue.sync_queue_url.as_deref() {
        Some(url) => Some(Arc::new(Queue::new(QueueConfig::from_app(&config.queue, url)).await?)),
        None => {
            warn!("queue.sync_queue_url not set, refresh runs will stay queued");
            None
        }
    };

    let processor = ImportProcessor::new(db, sync_queue);

    // ingestion import <user_id> <file.json> [--refresh]
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 3 && args[1] == "import" {
        let user_id = args[2].parse::<uuid::Uuid>()?;
        let refresh = args.iter().any(|a| a == "--refresh");
        let outcome = processor.process_file(Path::new(&args[3]), user_id, refresh).await?;

        println!("Import applied:");
        println!("  Created: {}", outcome.summary.created);
        println!("  Updated: {}", outcome.summary.updated);
        println!("  Skipped: {}", outcome.summary.skipped);
        if let Some(run_id) = outcome.sync_run_id {
            println!("  Refresh run: {}", run_id);
        }
        return Ok(());
    }

    let import_queue = match config.queue.import_queue_url.as_deref() {
        Some(url) => {
            info!(url = %url, "Connecting to import queue...");
            Queue::new(QueueConfig::from_app(&config.queue, url)).await?
        }
        None => {
            warn!("queue.import_queue_url not set, waiting for shutdown signal...");
            tokio::signal::ctrl_c().await?;
            info!("Ingestion service shutting down");
            return Ok(());
        }
    };

    info!("Ingestion service ready, starting queue polling...");

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
            result = import_queue.receive_jobs::<ShelfImportJobMessage>() => {
                match result {
                    Ok(jobs) => {
                        for (job, receipt_handle) in jobs {
                            let job_id = job.job_id;
                            info!(
                                job_id = %job_id,
                                items = job.items.len(),
                                "Received shelf import job"
                            );

                            match processor.process_job(job).await {
                                Ok(outcome) => {
                                    consecutive_failures = 0;
                                    record_queue_message(QUEUE_NAME, true);
                                    info!(
                                        job_id = %job_id,
                                        created = outcome.summary.created,
                                        updated = outcome.summary.updated,
                                        "Shelf import job completed"
                                    );
                                    if let Err(e) = import_queue.delete(&receipt_handle).await {
                                        error!(error = %e, "Failed to delete message");
                                    }
                                }
                                Err(e) => {
                                    consecutive_failures += 1;
                                    record_queue_message(QUEUE_NAME, false);
                                    error!(
                                        job_id = %job_id,
                                        error = %e,
                                        failures = consecutive_failures,
                                        "Failed to process shelf import job"
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

    info!("Ingestion service shutting down");
    Ok(())
}
