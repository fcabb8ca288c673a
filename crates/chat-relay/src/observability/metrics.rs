//! Metrics definitions for the relay.
//!
//! All metrics follow Prometheus naming conventions:
//! - `relay_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Identities never appear as labels. Every label is bounded by code:
//! - `outcome`: at most 3 values per metric
//! - `operation`: register, deregister, snapshot

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metric is recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Presence store latency - internal service call (p99 < 10ms expected)
        .set_buckets_for_metric(
            Matcher::Prefix("relay_presence".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set presence latency buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("relay_broadcast_recipients".to_string()),
            &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0],
        )
        .map_err(|e| format!("Failed to set broadcast recipient buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Lifecycle
// ============================================================================

/// Record a connect attempt that got past the identity check.
///
/// Metric: `relay_sessions_connected_total`
/// Labels: `outcome` (success, provision_error, storage_error)
pub fn record_session_connect(outcome: &'static str) {
    counter!("relay_sessions_connected_total", "outcome" => outcome).increment(1);
}

/// Record a processed disconnect notification.
///
/// Metric: `relay_sessions_disconnected_total`
/// Labels: `outcome` (removed, error)
pub fn record_session_disconnect(outcome: &'static str) {
    counter!("relay_sessions_disconnected_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Fanout
// ============================================================================

/// Record one completed broadcast and its per-recipient outcomes.
///
/// Metrics:
/// - `relay_broadcasts_total`
/// - `relay_deliveries_total` (`outcome`: delivered, failed)
/// - `relay_broadcast_recipients` (histogram of snapshot size)
pub fn record_broadcast(delivered: usize, failed: usize) {
    counter!("relay_broadcasts_total").increment(1);
    counter!("relay_deliveries_total", "outcome" => "delivered").increment(delivered as u64);
    counter!("relay_deliveries_total", "outcome" => "failed").increment(failed as u64);

    // usize to f64 conversion is safe for realistic recipient counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    histogram!("relay_broadcast_recipients").record((delivered + failed) as f64);
}

// ============================================================================
// Presence Store
// ============================================================================

/// Record presence store command latency.
///
/// Metric: `relay_presence_latency_seconds`
/// Labels: `operation` (register, deregister, snapshot)
pub fn record_presence_latency(operation: &'static str, duration: Duration) {
    histogram!("relay_presence_latency_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}
