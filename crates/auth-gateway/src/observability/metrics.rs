//! Metrics definitions for the Auth Gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix for the gateway
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 8 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS, OTHER)
//! - `endpoint`: 4 values (operational paths, everything else is `/proxy`)
//! - `status`: 3 values (success, error, timeout)
//! - `outcome`: bounded by token validation results
//!
//! Token validation failure reasons are deliberately not a label value; they
//! stay in debug logs.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gw_backend_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set backend request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures every response, including 401 rejections and 404s from the
/// operational router.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let method = normalize_method(method);
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method,
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method,
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse non-standard methods into `OTHER`
///
/// The proxy accepts any method token, including extension methods.
fn normalize_method(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        _ => "OTHER",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Proxied paths are arbitrary backend URLs, so they share one label.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => "/proxy",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record a token validation outcome
///
/// Metric: `gw_token_validations_total`
/// Labels: `outcome` (`accepted`, `rejected`, `missing`)
pub fn record_token_validation(outcome: &'static str) {
    counter!("gw_token_validations_total", "outcome" => outcome).increment(1);
}

/// Record a JWKS refresh attempt
///
/// Metric: `gw_jwks_refresh_total`
/// Labels: `status` (`success`, `error`)
pub fn record_jwks_refresh(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("gw_jwks_refresh_total", "status" => status).increment(1);
}

// ============================================================================
// Backend Metrics
// ============================================================================

/// Record a forwarded request's round-trip to the backend
///
/// Metric: `gw_backend_request_duration_seconds`
/// Labels: `status` (`success`, `error`, `timeout`, or `unreachable`)
pub fn record_backend_request(status_code: Option<u16>, duration: Duration) {
    let status = status_code.map_or("unreachable", categorize_status_code);

    histogram!("gw_backend_request_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Tests
// ============================================================================
