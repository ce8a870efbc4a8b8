//! Telephony metrics
//!
//! Recorded through the `metrics` facade. Installing a recorder/exporter is
//! left to the embedding application.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::{Duration, Instant};

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(
        "telephony_graphql_requests_total",
        "Total number of GraphQL operations executed"
    );
    describe_histogram!(
        "telephony_graphql_request_duration_seconds",
        "GraphQL operation duration in seconds"
    );
    describe_counter!(
        "telephony_subscription_events_total",
        "Realtime notifications received, by channel and kind"
    );
    describe_gauge!(
        "telephony_subscribers",
        "Number of registered subscribers per channel"
    );
    describe_counter!(
        "telephony_decrypt_failures_total",
        "Sealed records that could not be opened"
    );
    describe_counter!(
        "telephony_media_transfers_total",
        "Media uploads and downloads"
    );
}

/// Record a GraphQL round trip
pub fn record_graphql_request(operation: &str, outcome: &str, duration: Duration) {
    counter!(
        "telephony_graphql_requests_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "telephony_graphql_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_subscription_event(channel: &str, kind: &str) {
    counter!(
        "telephony_subscription_events_total",
        "channel" => channel.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn update_subscribers(channel: &str, count: usize) {
    gauge!("telephony_subscribers", "channel" => channel.to_string()).set(count as f64);
}

pub fn record_decrypt_failure(record: &str) {
    counter!("telephony_decrypt_failures_total", "record" => record.to_string()).increment(1);
}

pub fn record_media_transfer(direction: &str, success: bool) {
    counter!(
        "telephony_media_transfers_total",
        "direction" => direction.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

/// Timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
