//! Auth Gateway Library
//!
//! An authenticating reverse proxy. Every request that is not an operational
//! endpoint must carry a bearer token signed by the identity provider; valid
//! requests are forwarded to the backend with selected claims in a header,
//! everything else is rejected with a generic 401.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/*.rs
//!                                     -> handlers/proxy.rs -> backend
//! ```
//!
//! # Modules
//!
//! - `auth` - Key provider, token validator, claim extraction
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - Health, metrics and proxy handlers
//! - `middleware` - Request filter and HTTP metrics
//! - `models` - Response models
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
