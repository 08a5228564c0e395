//! Middleware for the Auth Gateway.
//!
//! # Components
//!
//! - `auth` - Token validation and claim header injection for proxied routes
//! - `http_metrics` - Request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{forward_auth, AuthState};
pub use http_metrics::http_metrics_middleware;
