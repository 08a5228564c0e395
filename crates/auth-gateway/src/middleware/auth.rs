//! Authentication middleware for proxied routes.
//!
//! Extracts the bearer token from the Authorization header, validates it,
//! extracts the configured claims and writes them into the outbound header
//! before the request continues to the backend.

use crate::auth::{extract, HeaderEncoding, JwtValidator};
use crate::errors::GatewayError;
use crate::observability::metrics::record_token_validation;
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// JWT validator with JWKS-backed key provider.
    pub jwt_validator: Arc<JwtValidator>,

    /// Outbound header carrying the extracted claims.
    pub header_name: HeaderName,

    /// Encoding of the outbound header value.
    pub encoding: HeaderEncoding,

    /// Dotted key-paths to extract, in configured order.
    pub extract_keys: Arc<[String]>,
}

/// Authentication middleware in front of the backend proxy.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// The scheme is matched case-insensitively.
///
/// # Response
///
/// - Returns 401 with the generic `{"error": "Invalid token"}` body if the
///   token is missing, malformed or fails any validation check
/// - Otherwise sets the configured header (replacing any client-supplied
///   value) and continues to the next handler
#[instrument(skip(state, req, next), name = "gw.middleware.auth")]
pub async fn forward_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GatewayError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| {
            tracing::debug!(target: "gw.middleware.auth", "Missing or malformed Authorization header");
            record_token_validation("missing");
            GatewayError::Unauthorized
        })?;

    let claims = match state.jwt_validator.validate(token).await {
        Ok(claims) => claims,
        Err(e) => {
            record_token_validation("rejected");
            return Err(e.into());
        }
    };
    record_token_validation("accepted");

    let extracted = extract(&state.extract_keys, &claims);
    let encoded = state.encoding.encode(&extracted);
    let value = HeaderValue::from_bytes(encoded.as_bytes()).map_err(|e| {
        GatewayError::Internal(format!("extracted claims are not a valid header value: {e}"))
    })?;

    req.headers_mut().insert(state.header_name.clone(), value);

    Ok(next.run(req).await)
}

/// Extract the token from an `Authorization` header value.
///
/// Returns `None` unless the value is exactly `<scheme> <token>` with a
/// case-insensitive `bearer` scheme.
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}
