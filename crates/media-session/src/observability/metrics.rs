//! Metrics definitions for the media session.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ms_` prefix for media session
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `outcome`: success, error
//! - `direction`: send, recv
//! - `kind`: audio, video, screen_audio, screen_video
//! - `reason`: hang_up, end_call, call_ended, reconnect_failed, shutdown

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Record a join attempt.
///
/// Metrics: `ms_session_joins_total`, `ms_join_duration_seconds`
/// Labels: `outcome`
pub fn record_join(outcome: &str, duration: Duration) {
    counter!("ms_session_joins_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("ms_join_duration_seconds").record(duration.as_secs_f64());
}

/// Record a session teardown.
///
/// Metric: `ms_sessions_ended_total`
/// Labels: `reason`
pub fn record_session_ended(reason: &str) {
    counter!("ms_sessions_ended_total", "reason" => reason.to_string()).increment(1);
}

// ============================================================================
// Transports, Producers, Consumers
// ============================================================================

/// Record a DTLS connect handshake.
///
/// Metric: `ms_transport_connects_total`
/// Labels: `direction`, `outcome`
///
/// Cardinality: 4
pub fn record_transport_connect(direction: &str, outcome: &str) {
    counter!(
        "ms_transport_connects_total",
        "direction" => direction.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a local producer creation attempt.
///
/// Metric: `ms_producers_created_total`
/// Labels: `kind`, `outcome`
///
/// Cardinality: 8
pub fn record_producer_created(kind: &str, outcome: &str) {
    counter!(
        "ms_producers_created_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a remote sub-stream consume attempt.
///
/// Metric: `ms_consumers_created_total`
/// Labels: `kind`, `outcome`
///
/// Cardinality: 4
pub fn record_consumer_created(kind: &str, outcome: &str) {
    counter!(
        "ms_consumers_created_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set the number of registered remote publisher groups.
///
/// Metric: `ms_publisher_groups_active`
/// Labels: none
pub fn set_publisher_groups_active(count: usize) {
    // usize to f64 conversion is safe for realistic group counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("ms_publisher_groups_active").set(count as f64);
}
