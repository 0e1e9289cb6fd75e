//! Metrics definitions for the authorizer.
//!
//! All metrics follow Prometheus naming conventions:
//! - `authz_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `decision`: 2 values (allow, deny)
//! - `reason`: bounded by `AuthzError::kind()` plus `granted`
//! - `endpoint`: the few static routes plus `/other`
//! - `status`: bounded by code (success, error, unprocessed)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (e.g. already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("authz_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Decisions sit on the request path of every API call
        .set_buckets_for_metric(
            Matcher::Prefix("authz_decision".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 3.000,
            ],
        )
        .map_err(|e| format!("Failed to set decision buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("authz_store_batch_get".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set store buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `authz_http_requests_total`, `authz_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
///
/// Includes framework-level rejections (400, 404, 405, 415).
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("authz_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("authz_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto a bounded set of endpoint labels.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/authorize" => "/authorize",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => "/other",
    }
}

// ============================================================================
// Decision Metrics
// ============================================================================

/// Record one authorization decision.
///
/// Metric: `authz_decisions_total`, `authz_decision_duration_seconds`
/// Labels: `decision` (allow/deny), `reason` (`granted` or an error kind)
pub fn record_decision(decision: &'static str, reason: &'static str, duration: Duration) {
    histogram!("authz_decision_duration_seconds",
        "decision" => decision
    )
    .record(duration.as_secs_f64());

    counter!("authz_decisions_total",
        "decision" => decision,
        "reason" => reason
    )
    .increment(1);
}

// ============================================================================
// Lookup Store Metrics
// ============================================================================

/// Record one batch-get call.
///
/// Metric: `authz_store_batch_get_total`, `authz_store_batch_get_duration_seconds`
/// Labels: `status` (success, unprocessed, error)
pub fn record_batch_get(status: &'static str, duration: Duration) {
    histogram!("authz_store_batch_get_duration_seconds").record(duration.as_secs_f64());

    counter!("authz_store_batch_get_total",
        "status" => status
    )
    .increment(1);
}

/// Record a retry of unprocessed keys.
///
/// Metric: `authz_store_unprocessed_retries_total`
pub fn record_unprocessed_retry() {
    counter!("authz_store_unprocessed_retries_total").increment(1);
}

// ============================================================================
// Key Cache Metrics
// ============================================================================

/// Set the number of signing keys loaded at startup.
///
/// Metric: `authz_jwks_keys_loaded`
pub fn set_jwks_keys_loaded(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("authz_jwks_keys_loaded").set(count as f64);
}

// ============================================================================
// Tests
// ============================================================================
