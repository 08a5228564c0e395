//! JWT utilities shared across the auth gateway crates.
//!
//! This module provides the token checks that do not depend on a
//! verification key:
//! - Size limits for DoS prevention
//! - Clock skew constants for time-claim validation
//! - Header parsing (`kid`, `alg`) ahead of key lookup
//! - Issuer, audience and time-claim validation on a decoded claim set
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Error variants are for server-side logging only; callers collapse them
//!   into a single generic rejection before anything reaches a client
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{parse_token_header, validate_audience, validate_issuer,
//!                   validate_time_claims, DEFAULT_CLOCK_SKEW};
//!
//! let header = parse_token_header(token)?;
//! // ... resolve key by header.kid and verify the signature ...
//! validate_issuer(&claims, "https://tenant.auth0.com/")?;
//! validate_audience(&claims, "https://api.example.com")?;
//! validate_time_claims(&claims, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any parsing or cryptographic
/// operations.
///
/// - Typical identity-provider access tokens are 700-1500 bytes
/// - 8KB leaves room for large custom claim namespaces
/// - Checked BEFORE base64 decode and signature verification
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (60 seconds).
///
/// Applied in both directions: an expired token is still accepted for this
/// long, and `nbf`/`iat` may lie this far in the future.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Upper bound for configuration so that a typo cannot turn expiry checks off.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT validation.
///
/// These never leave the process: the request filter maps every variant to
/// the same unauthorized response. The messages exist for debug logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("token exceeds maximum size")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure or claim types).
    #[error("token is malformed")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("token header has no key id")]
    MissingKid,

    /// The verification key could not be resolved.
    #[error("signing key could not be resolved: {0}")]
    KeyResolution(String),

    /// Signature did not verify, or the token uses a disallowed algorithm.
    #[error("token signature is invalid")]
    SignatureError,

    /// `iss` claim missing or different from the expected issuer.
    #[error("token issuer does not match")]
    IssuerMismatch,

    /// `aud` claim missing or does not contain the expected audience.
    #[error("token audience does not match")]
    AudienceMismatch,

    /// `exp` lies further in the past than the clock skew allows.
    #[error("token has expired")]
    TokenExpired,

    /// `nbf` or `iat` lies further in the future than the clock skew allows.
    #[error("token is not yet valid")]
    TokenNotYetValid,
}

// =============================================================================
// Header Parsing
// =============================================================================

/// The JOSE header fields needed before signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Signing algorithm named by the token (untrusted until verified).
    pub alg: String,

    /// Key ID used to select the verification key.
    pub kid: String,
}

/// Parse the JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
/// - The `kid` value should only be used for key lookup in a trusted JWKS
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, invalid JSON, or no `alg`
/// - `MissingKid` - Header missing `kid`, `kid` not a string, or empty
pub fn parse_token_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = header
        .get("alg")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MalformedToken)?;

    let kid = header
        .get("kid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)?;

    Ok(TokenHeader { alg, kid })
}

// =============================================================================
// Claim Checks
// =============================================================================

/// Validate the `iss` claim against the expected issuer URL.
///
/// Comparison is exact apart from trailing slashes, which are ignored on
/// both sides (`https://tenant.auth0.com` matches `https://tenant.auth0.com/`).
///
/// # Errors
///
/// Returns `IssuerMismatch` if `iss` is missing, not a string, or different.
pub fn validate_issuer(
    claims: &Map<String, Value>,
    expected: &str,
) -> Result<(), JwtValidationError> {
    let issuer = claims
        .get("iss")
        .and_then(Value::as_str)
        .ok_or(JwtValidationError::IssuerMismatch)?;

    if strip_trailing_slash(issuer) == strip_trailing_slash(expected) {
        Ok(())
    } else {
        tracing::debug!(
            target: "common.jwt",
            issuer = %issuer,
            expected = %expected,
            "Token rejected: issuer mismatch"
        );
        Err(JwtValidationError::IssuerMismatch)
    }
}

fn strip_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// Validate that the `aud` claim contains the expected audience.
///
/// `aud` may be a single string or an array of strings.
///
/// # Errors
///
/// Returns `AudienceMismatch` if `aud` is missing, of the wrong type, or
/// does not contain `expected`.
pub fn validate_audience(
    claims: &Map<String, Value>,
    expected: &str,
) -> Result<(), JwtValidationError> {
    let matches = match claims.get("aud") {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(expected)),
        _ => false,
    };

    if matches {
        Ok(())
    } else {
        tracing::debug!(target: "common.jwt", "Token rejected: audience mismatch");
        Err(JwtValidationError::AudienceMismatch)
    }
}

/// Validate `exp`, `nbf` and `iat` against the current time.
///
/// # Errors
///
/// See [`validate_time_claims_at`].
pub fn validate_time_claims(
    claims: &Map<String, Value>,
    clock_skew: Duration,
) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_time_claims_at(claims, clock_skew, now)
}

/// Deterministic time-claim validation against an explicit `now` timestamp.
///
/// Each claim is only checked when present:
/// - `exp`: rejected when `now - clock_skew > exp`
/// - `nbf`: rejected when `now + clock_skew < nbf`
/// - `iat`: rejected when `now + clock_skew < iat`
///
/// # Errors
///
/// - `TokenExpired` - `exp` is beyond the skew tolerance in the past
/// - `TokenNotYetValid` - `nbf` or `iat` is beyond the skew tolerance in the future
/// - `MalformedToken` - a time claim is present but not numeric
pub fn validate_time_claims_at(
    claims: &Map<String, Value>,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Clock skew is bounded to MAX_CLOCK_SKEW at configuration time
    let clock_skew_secs = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    let earliest = now.saturating_sub(clock_skew_secs);
    let latest = now.saturating_add(clock_skew_secs);

    if let Some(exp) = numeric_claim(claims, "exp")? {
        if earliest > exp {
            tracing::debug!(target: "common.jwt", exp, now, clock_skew_secs, "Token rejected: expired");
            return Err(JwtValidationError::TokenExpired);
        }
    }

    for name in ["nbf", "iat"] {
        if let Some(value) = numeric_claim(claims, name)? {
            if latest < value {
                tracing::debug!(
                    target: "common.jwt",
                    claim = name,
                    value,
                    now,
                    clock_skew_secs,
                    "Token rejected: not yet valid"
                );
                return Err(JwtValidationError::TokenNotYetValid);
            }
        }
    }

    Ok(())
}

/// Read a NumericDate claim as whole seconds.
///
/// Fractional values are truncated toward zero.
#[allow(clippy::cast_possible_truncation)]
fn numeric_claim(
    claims: &Map<String, Value>,
    name: &str,
) -> Result<Option<i64>, JwtValidationError> {
    match claims.get(name) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or(JwtValidationError::MalformedToken),
        Some(_) => {
            tracing::debug!(target: "common.jwt", claim = name, "Token rejected: non-numeric time claim");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    // -------------------------------------------------------------------------
    // Constants Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_default_clock_skew_is_one_minute() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(60));
    }

    #[test]
    fn test_max_clock_skew_is_10_minutes() {
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // parse_token_header Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_header_valid_token() {
        let header = r#"{"alg":"RS256","typ":"JWT","kid":"test-key-01"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let parsed = parse_token_header(&token).unwrap();
        assert_eq!(parsed.kid, "test-key-01");
        assert_eq!(parsed.alg, "RS256");
    }

    #[test]
    fn test_parse_header_missing_kid() {
        let header = r#"{"alg":"RS256","typ":"JWT"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let result = parse_token_header(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingKid)));
    }

    #[test]
    fn test_parse_header_empty_kid() {
        let header = r#"{"alg":"RS256","typ":"JWT","kid":""}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let result = parse_token_header(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingKid)));
    }

    #[test]
    fn test_parse_header_non_string_kid() {
        let header = r#"{"alg":"RS256","typ":"JWT","kid":12345}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let result = parse_token_header(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingKid)));
    }

    #[test]
    fn test_parse_header_missing_alg() {
        let header = r#"{"typ":"JWT","kid":"k"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let token = format!("{header_b64}.payload.signature");

        let result = parse_token_header(&token);
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_parse_header_wrong_part_count() {
        for token in ["not-a-jwt", "", "only.two", "a.b.c.d"] {
            let result = parse_token_header(token);
            assert!(
                matches!(result, Err(JwtValidationError::MalformedToken)),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_header_invalid_base64() {
        let result = parse_token_header("!!!invalid!!!.payload.signature");
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_parse_header_invalid_json() {
        let header_b64 = URL_SAFE_NO_PAD.encode("not-json");
        let token = format!("{header_b64}.payload.signature");

        let result = parse_token_header(&token);
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_parse_header_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result = parse_token_header(&oversized);
        assert!(matches!(result, Err(JwtValidationError::TokenTooLarge)));
    }

    #[test]
    fn test_parse_header_at_size_limit() {
        let header = r#"{"alg":"RS256","typ":"JWT","kid":"key"}"#;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2; // -2 for two dots
        let payload_len = remaining / 2;
        let sig_len = remaining - payload_len;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(sig_len)
        );

        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);
        assert_eq!(parse_token_header(&token).unwrap().kid, "key");
    }

    // -------------------------------------------------------------------------
    // validate_issuer Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_issuer_exact_match() {
        let c = claims(json!({"iss": "https://tenant.auth0.com/"}));
        assert!(validate_issuer(&c, "https://tenant.auth0.com/").is_ok());
    }

    #[test]
    fn test_issuer_trailing_slash_normalized() {
        let without = claims(json!({"iss": "https://tenant.auth0.com"}));
        assert!(validate_issuer(&without, "https://tenant.auth0.com/").is_ok());

        let with = claims(json!({"iss": "https://tenant.auth0.com/"}));
        assert!(validate_issuer(&with, "https://tenant.auth0.com").is_ok());
    }

    #[test]
    fn test_issuer_only_one_trailing_slash_normalized() {
        let doubled = claims(json!({"iss": "https://tenant.auth0.com//"}));
        assert_eq!(
            validate_issuer(&doubled, "https://tenant.auth0.com/"),
            Err(JwtValidationError::IssuerMismatch)
        );
        assert!(validate_issuer(&doubled, "https://tenant.auth0.com//").is_ok());
    }

    #[test]
    fn test_issuer_mismatch() {
        let c = claims(json!({"iss": "https://evil.example.com/"}));
        assert_eq!(
            validate_issuer(&c, "https://tenant.auth0.com/"),
            Err(JwtValidationError::IssuerMismatch)
        );
    }

    #[test]
    fn test_issuer_missing_or_wrong_type() {
        let missing = claims(json!({}));
        assert_eq!(
            validate_issuer(&missing, "https://tenant.auth0.com/"),
            Err(JwtValidationError::IssuerMismatch)
        );

        let numeric = claims(json!({"iss": 42}));
        assert_eq!(
            validate_issuer(&numeric, "https://tenant.auth0.com/"),
            Err(JwtValidationError::IssuerMismatch)
        );
    }

    #[test]
    fn test_issuer_is_case_sensitive() {
        let c = claims(json!({"iss": "https://TENANT.auth0.com/"}));
        assert!(validate_issuer(&c, "https://tenant.auth0.com/").is_err());
    }

    // -------------------------------------------------------------------------
    // validate_audience Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_audience_string() {
        let c = claims(json!({"aud": "https://api.example.com"}));
        assert!(validate_audience(&c, "https://api.example.com").is_ok());
        assert_eq!(
            validate_audience(&c, "https://other.example.com"),
            Err(JwtValidationError::AudienceMismatch)
        );
    }

    #[test]
    fn test_audience_array_contains() {
        let c = claims(json!({
            "aud": ["https://api.example.com", "https://tenant.auth0.com/userinfo"]
        }));
        assert!(validate_audience(&c, "https://tenant.auth0.com/userinfo").is_ok());
        assert!(validate_audience(&c, "https://api.example.com").is_ok());
        assert!(validate_audience(&c, "https://nope.example.com").is_err());
    }

    #[test]
    fn test_audience_missing_or_wrong_type() {
        assert!(validate_audience(&claims(json!({})), "a").is_err());
        assert!(validate_audience(&claims(json!({"aud": 7})), "a").is_err());
        assert!(validate_audience(&claims(json!({"aud": [7, null]})), "a").is_err());
    }

    #[test]
    fn test_audience_no_partial_match() {
        let c = claims(json!({"aud": "https://api.example.com/v2"}));
        assert!(validate_audience(&c, "https://api.example.com").is_err());
    }

    // -------------------------------------------------------------------------
    // validate_time_claims Tests
    // -------------------------------------------------------------------------

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_time_claims_absent_are_accepted() {
        assert!(validate_time_claims_at(&claims(json!({})), DEFAULT_CLOCK_SKEW, NOW).is_ok());
    }

    #[test]
    fn test_time_claims_current_token() {
        let c = claims(json!({"exp": NOW + 3600, "nbf": NOW - 10, "iat": NOW - 10}));
        assert!(validate_time_claims_at(&c, DEFAULT_CLOCK_SKEW, NOW).is_ok());

        let live = claims(json!({"exp": chrono::Utc::now().timestamp() + 60}));
        assert!(validate_time_claims(&live, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_exp_at_skew_boundary() {
        // exp == now - skew is the last accepted value
        let at = claims(json!({"exp": NOW - 60}));
        assert!(validate_time_claims_at(&at, DEFAULT_CLOCK_SKEW, NOW).is_ok());

        // one second further in the past is rejected
        let beyond = claims(json!({"exp": NOW - 61}));
        assert_eq!(
            validate_time_claims_at(&beyond, DEFAULT_CLOCK_SKEW, NOW),
            Err(JwtValidationError::TokenExpired)
        );
    }

    #[test]
    fn test_nbf_at_skew_boundary() {
        let at = claims(json!({"nbf": NOW + 60}));
        assert!(validate_time_claims_at(&at, DEFAULT_CLOCK_SKEW, NOW).is_ok());

        let beyond = claims(json!({"nbf": NOW + 61}));
        assert_eq!(
            validate_time_claims_at(&beyond, DEFAULT_CLOCK_SKEW, NOW),
            Err(JwtValidationError::TokenNotYetValid)
        );
    }

    #[test]
    fn test_iat_in_future_beyond_skew() {
        let at = claims(json!({"iat": NOW + 60}));
        assert!(validate_time_claims_at(&at, DEFAULT_CLOCK_SKEW, NOW).is_ok());

        let beyond = claims(json!({"iat": NOW + 3600}));
        assert_eq!(
            validate_time_claims_at(&beyond, DEFAULT_CLOCK_SKEW, NOW),
            Err(JwtValidationError::TokenNotYetValid)
        );
    }

    #[test]
    fn test_expiry_checked_before_not_before() {
        let c = claims(json!({"exp": NOW - 3600, "nbf": NOW + 3600}));
        assert_eq!(
            validate_time_claims_at(&c, DEFAULT_CLOCK_SKEW, NOW),
            Err(JwtValidationError::TokenExpired)
        );
    }

    #[test]
    fn test_fractional_time_claims_truncate() {
        let c = claims(json!({"exp": (NOW - 60) as f64 + 0.5}));
        assert!(validate_time_claims_at(&c, DEFAULT_CLOCK_SKEW, NOW).is_ok());
    }

    #[test]
    fn test_non_numeric_time_claim_is_malformed() {
        let c = claims(json!({"exp": "tomorrow"}));
        assert_eq!(
            validate_time_claims_at(&c, DEFAULT_CLOCK_SKEW, NOW),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_zero_skew_is_strict() {
        let c = claims(json!({"exp": NOW - 1}));
        assert_eq!(
            validate_time_claims_at(&c, Duration::ZERO, NOW),
            Err(JwtValidationError::TokenExpired)
        );
        assert!(validate_time_claims_at(&claims(json!({"exp": NOW})), Duration::ZERO, NOW).is_ok());
    }
}
