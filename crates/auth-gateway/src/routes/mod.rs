//! HTTP routes for the Auth Gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::{HeaderEncoding, JwksClient, JwtValidator, KeyProvider};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{forward_auth, http_metrics_middleware, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Timeout for a single proxied request to the backend.
const BACKEND_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// HTTP client used to forward requests to the backend.
    pub http_client: reqwest::Client,

    /// JWKS client shared by the validator and the readiness probe.
    pub jwks_client: Arc<JwksClient>,
}

impl AppState {
    /// Build the application state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend HTTP client cannot be constructed.
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(BACKEND_REQUEST_TIMEOUT_SECONDS))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let jwks_client = Arc::new(JwksClient::new(config.jwks_url.clone()));

        Ok(Self {
            config,
            http_client,
            jwks_client,
        })
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/ready` - Readiness probe (checks JWKS) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - everything else - authenticated, then proxied to the backend
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    // One validator for the lifetime of the process
    let key_provider: Arc<dyn KeyProvider> = state.jwks_client.clone();
    let jwt_validator = Arc::new(JwtValidator::new(
        key_provider,
        state.config.issuer_url(),
        state.config.auth0_audience.clone(),
        state.config.jwt_clock_skew,
    ));
    let auth_state = Arc::new(AuthState {
        jwt_validator,
        header_name: state.config.proxy_header_name.clone(),
        encoding: HeaderEncoding::from_json_flag(state.config.proxy_header_value_as_json),
        extract_keys: state.config.extract_keys.clone().into(),
    });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Everything else is authenticated and forwarded
    let proxied_routes = Router::new()
        .fallback(handlers::proxy_request)
        .layer(middleware::from_fn_with_state(auth_state, forward_auth))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TraceLayer - Log request details (innermost)
    // 2. TimeoutLayer - Bound the whole request, auth included
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(proxied_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            BACKEND_REQUEST_TIMEOUT_SECONDS,
        )))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_config_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Config>();
    }
}
