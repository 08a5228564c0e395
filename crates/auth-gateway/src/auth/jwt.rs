//! JWT validation for the Auth Gateway.
//!
//! Validates incoming bearer tokens using public keys resolved through a
//! [`KeyProvider`] (normally the identity provider's JWKS endpoint).
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted; `none`, HMAC and every other algorithm are rejected
//!   before any key lookup happens
//! - Issuer, audience and time claims are checked after the signature verifies
//! - Failure reasons are logged at debug level and never returned to clients

use crate::auth::claims::ClaimTree;
use crate::auth::jwks::KeyProvider;
use common::jwt::{
    parse_token_header, validate_audience, validate_issuer, validate_time_claims,
    JwtValidationError,
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// The only signing algorithm the gateway accepts.
const ALLOWED_ALGORITHM: &str = "RS256";

/// JWT validator shared by every request.
///
/// Built once at startup; holds no per-request state, so a single instance
/// behind an `Arc` serves all concurrent requests.
pub struct JwtValidator {
    /// Resolves `kid` to a verification key.
    key_provider: Arc<dyn KeyProvider>,

    /// Expected `iss` claim.
    issuer: String,

    /// Audience that `aud` must contain.
    audience: String,

    /// Tolerance applied to `exp`, `nbf` and `iat`.
    clock_skew: Duration,
}

impl JwtValidator {
    /// Create a new JWT validator.
    ///
    /// # Arguments
    ///
    /// * `key_provider` - Source of verification keys
    /// * `issuer` - Expected issuer URL (trailing slash optional)
    /// * `audience` - Audience the token must be issued for
    /// * `clock_skew` - Clock skew tolerance for time-claim validation
    pub fn new(
        key_provider: Arc<dyn KeyProvider>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        clock_skew: Duration,
    ) -> Self {
        Self {
            key_provider,
            issuer: issuer.into(),
            audience: audience.into(),
            clock_skew,
        }
    }

    /// Validate a JWT and return its full claim tree.
    ///
    /// # Security Checks
    ///
    /// 1. Size check - reject tokens > 8KB before parsing
    /// 2. Parse header, require `kid` and `alg == RS256`
    /// 3. Resolve the verification key through the key provider
    /// 4. Verify the RS256 signature
    /// 5. Validate `iss` (trailing slash normalized)
    /// 6. Validate `aud` contains the configured audience
    /// 7. Validate `exp`, `nbf` and `iat` with clock skew tolerance
    ///
    /// # Errors
    ///
    /// Returns the `JwtValidationError` of the first check that failed. The
    /// request filter collapses all of them into one unauthorized response.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<ClaimTree, JwtValidationError> {
        let header = parse_token_header(token).map_err(|e| {
            tracing::debug!(target: "gw.auth.jwt", error = ?e, "Token header rejected");
            e
        })?;

        if header.alg != ALLOWED_ALGORITHM {
            tracing::debug!(target: "gw.auth.jwt", alg = %header.alg, "Token algorithm not allowed");
            return Err(JwtValidationError::SignatureError);
        }

        let key = self.key_provider.resolve_key(&header.kid).await?;

        let claims = decode::<ClaimTree>(token, &key, &signature_only_validation())
            .map_err(|e| {
                tracing::debug!(target: "gw.auth.jwt", error = %e, "Token verification failed");
                match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidAlgorithm
                    | ErrorKind::InvalidAlgorithmName
                    | ErrorKind::InvalidKeyFormat
                    | ErrorKind::InvalidRsaKey(_) => JwtValidationError::SignatureError,
                    _ => JwtValidationError::MalformedToken,
                }
            })?
            .claims;

        validate_issuer(&claims, &self.issuer)?;
        validate_audience(&claims, &self.audience)?;
        validate_time_claims(&claims, self.clock_skew)?;

        tracing::debug!(target: "gw.auth.jwt", "Token validated successfully");
        Ok(claims)
    }
}

/// `jsonwebtoken` settings that verify the RS256 signature and nothing else.
///
/// Claim checks run separately so that claims are only checked when present
/// and so that skew is applied to `iat` as well.
fn signature_only_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}
