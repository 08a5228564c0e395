//! HTTP request handlers for the Auth Gateway.

pub mod health;
pub mod metrics;
pub mod proxy;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use proxy::proxy_request;
