//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks that signing keys are available

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Returns a simple "OK" response to indicate the process is running.
/// Does NOT check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 when a fresh key set is cached or can be fetched now, 503
/// otherwise. Without keys every proxied request would be rejected.
///
/// ## Security
///
/// Error messages are intentionally generic to avoid leaking infrastructure details.
/// Actual errors are logged server-side with `tracing::warn!`.
#[tracing::instrument(skip_all, name = "gw.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.jwks_client.is_warm().await {
        if let Err(e) = state.jwks_client.force_refresh().await {
            tracing::warn!(target: "gw.health", error = %e, "Readiness check failed: JWKS unavailable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    jwks: Some("unavailable"),
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            );
        }
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            jwks: Some("available"),
            error: None,
        }),
    )
}
