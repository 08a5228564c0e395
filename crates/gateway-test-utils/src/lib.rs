//! # Gateway Test Utilities
//!
//! Shared test utilities for the Auth Gateway.
//!
//! This crate provides:
//! - RSA signing fixtures (`TestKeypair`) and JWKS documents
//! - Server test harness (`TestGatewayServer` for E2E tests) with a mocked
//!   JWKS endpoint and an echoing backend
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let server = TestGatewayServer::spawn().await?;
//!     let client = reqwest::Client::new();
//!
//!     let response = client
//!         .get(format!("{}/health", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use server_harness::*;
