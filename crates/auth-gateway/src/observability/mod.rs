//! Observability module for the Auth Gateway.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
