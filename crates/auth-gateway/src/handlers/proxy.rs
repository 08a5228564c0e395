//! Reverse proxy to the protected backend.
//!
//! Forwards the (already authenticated) request to `BACKEND_URL` and streams
//! the backend's response back. Request bodies are buffered up to
//! `MAX_REQUEST_BODY_BYTES`.

use crate::errors::GatewayError;
use crate::observability::metrics::record_backend_request;
use crate::routes::AppState;
use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Largest request body forwarded to the backend.
pub const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Fallback handler forwarding every non-operational request to the backend.
///
/// # Errors
///
/// Returns `GatewayError::PayloadTooLarge` if the request body exceeds
/// `MAX_REQUEST_BODY_BYTES` and `GatewayError::BadGateway` if the backend
/// cannot be reached.
#[instrument(skip_all, name = "gw.proxy", fields(method = %req.method(), path = %req.uri().path()))]
pub async fn proxy_request(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, GatewayError> {
    let (parts, body) = req.into_parts();

    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = backend_url(&state.config.backend_url, path_and_query);

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let body = body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge(MAX_REQUEST_BODY_BYTES))?;

    let mut outbound = state
        .http_client
        .request(parts.method, &url)
        .headers(headers);
    if !body.is_empty() {
        outbound = outbound.body(body);
    }

    let start = Instant::now();
    let upstream = match outbound.send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            record_backend_request(None, start.elapsed());
            return Err(GatewayError::BadGateway(e.to_string()));
        }
    };
    record_backend_request(Some(upstream.status().as_u16()), start.elapsed());

    tracing::debug!(target: "gw.proxy", status = %upstream.status(), "Backend responded");

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;

    Ok(response)
}

/// Join the backend base URL with the request's path and query.
fn backend_url(base: &str, path_and_query: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path_and_query)
}

/// Remove hop-by-hop headers, including any named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}
