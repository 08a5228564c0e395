//! Auth Gateway error types.
//!
//! All errors map to HTTP responses via the `IntoResponse` impl. Messages
//! returned to clients are generic; the detailed cause is logged server-side.
//! Every token validation failure becomes the same `Unauthorized` response,
//! whatever check rejected it.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::JwtValidationError;
use serde::Serialize;
use thiserror::Error;

/// Body returned for every rejected token.
pub const UNAUTHORIZED_BODY: &str = r#"{"error": "Invalid token"}"#;

/// Auth Gateway error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized: 401 Unauthorized
/// - BadGateway: 502 Bad Gateway
/// - PayloadTooLarge: 413 Payload Too Large
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Unauthorized => 401,
            GatewayError::BadGateway(_) => 502,
            GatewayError::PayloadTooLarge(_) => 413,
            GatewayError::Internal(_) => 500,
        }
    }
}

impl From<JwtValidationError> for GatewayError {
    fn from(err: JwtValidationError) -> Self {
        tracing::debug!(target: "gw.auth", reason = %err, "Token rejected");
        GatewayError::Unauthorized
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::Unauthorized => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    [(header::CONTENT_TYPE, "application/json")],
                    UNAUTHORIZED_BODY,
                )
                    .into_response();
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer error=\"invalid_token\""),
                );
                return response;
            }
            GatewayError::BadGateway(reason) => {
                tracing::warn!(target: "gw.proxy", reason = %reason, "Backend unreachable");
                (StatusCode::BAD_GATEWAY, "Bad gateway")
            }
            GatewayError::PayloadTooLarge(limit) => {
                tracing::debug!(target: "gw.proxy", limit = limit, "Request body too large");
                (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
            }
            GatewayError::Internal(reason) => {
                tracing::error!(target: "gw.internal", reason = %reason, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred")
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
