//! Authentication module for the Auth Gateway.
//!
//! # Components
//!
//! - `jwks` - Key provider trait and the caching JWKS client
//! - `jwt` - Token validation using resolved RS256 keys
//! - `claims` - Claim extraction and outbound header encoding

pub mod claims;
pub mod jwks;
pub mod jwt;

pub use claims::{extract, ClaimTree, HeaderEncoding};
pub use jwks::{JwksClient, KeyProvider};
pub use jwt::JwtValidator;
