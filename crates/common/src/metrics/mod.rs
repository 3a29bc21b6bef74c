//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all ShelfSync metrics
pub const METRICS_PREFIX: &str = "shelfsync";

/// Buckets for catalog provider latency (in seconds)
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Buckets for whole sync runs (in seconds)
pub const SYNC_RUN_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Register all metric descriptions
pub fn register_metrics() {
    // Provider metrics
    describe_counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total catalog provider requests"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Catalog provider latency in seconds"
    );

    // Matching metrics
    describe_counter!(
        format!("{}_matches_total", METRICS_PREFIX),
        Unit::Count,
        "Shelf items resolved to a catalog item, by method"
    );

    describe_counter!(
        format!("{}_unmatched_total", METRICS_PREFIX),
        Unit::Count,
        "Shelf items without an acceptable catalog candidate"
    );

    // Sync run metrics
    describe_counter!(
        format!("{}_sync_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Sync runs finished, by outcome"
    );

    describe_histogram!(
        format!("{}_sync_run_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Sync run wall-clock time in seconds"
    );

    // Notification metrics
    describe_counter!(
        format!("{}_notifications_total", METRICS_PREFIX),
        Unit::Count,
        "Availability notifications created"
    );

    describe_counter!(
        format!("{}_publish_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Live events that could not be published"
    );

    // Import metrics
    describe_counter!(
        format!("{}_shelf_items_imported_total", METRICS_PREFIX),
        Unit::Count,
        "Shelf items created or updated by imports"
    );

    // Queue metrics
    describe_counter!(
        format!("{}_queue_messages_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total queue messages processed"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record catalog provider calls
pub fn record_provider_call(provider: &str, operation: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Helper to record matcher outcomes
pub fn record_match(method: Option<&str>) {
    match method {
        Some(method) => counter!(
            format!("{}_matches_total", METRICS_PREFIX),
            "method" => method.to_string()
        )
        .increment(1),
        None => counter!(format!("{}_unmatched_total", METRICS_PREFIX)).increment(1),
    }
}

/// Helper to record a finished sync run
pub fn record_sync_run(outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_sync_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_sync_run_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record created notifications
pub fn record_notifications(count: usize) {
    if count > 0 {
        counter!(format!("{}_notifications_total", METRICS_PREFIX)).increment(count as u64);
    }
}

/// Helper to record a dropped live event
pub fn record_publish_failure(channel_kind: &str) {
    counter!(
        format!("{}_publish_failures_total", METRICS_PREFIX),
        "channel" => channel_kind.to_string()
    )
    .increment(1);
}

/// Helper to record an applied shelf import
pub fn record_import(created: usize, updated: usize) {
    counter!(
        format!("{}_shelf_items_imported_total", METRICS_PREFIX),
        "action" => "created"
    )
    .increment(created as u64);

    counter!(
        format!("{}_shelf_items_imported_total", METRICS_PREFIX),
        "action" => "updated"
    )
    .increment(updated as u64);
}

/// Helper to record a processed queue message
pub fn record_queue_message(queue: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_queue_messages_processed_total", METRICS_PREFIX),
        "queue" => queue.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hits: usize, misses: usize, cache_name: &str) {
    counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        "cache" => cache_name.to_string()
    )
    .increment(hits as u64);

    counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        "cache" => cache_name.to_string()
    )
    .increment(misses as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_sorted() {
        for buckets in [PROVIDER_BUCKETS, SYNC_RUN_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_helpers_without_recorder() {
        // No recorder installed: calls are no-ops
        record_match(Some("isbn"));
        record_match(None);
        record_cache(3, 1, "memory");
        record_sync_run("succeeded", 1.5);
    }
}
