//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer`, a real gateway instance wired to a mocked
//! JWKS endpoint and a mocked backend that echoes what it received.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use auth_gateway::config::Config;
use auth_gateway::observability::metrics::init_metrics_recorder;
use auth_gateway::routes::{self, AppState};
use chrono::Utc;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Identity-provider domain used by every test server.
pub const TEST_DOMAIN: &str = "tenant.test.local";

/// Issuer URL derived from `TEST_DOMAIN`.
pub const TEST_ISSUER: &str = "https://tenant.test.local/";

/// Audience every test server expects.
pub const TEST_AUDIENCE: &str = "https://api.test.local";

/// Path of the mocked JWKS document.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Global metrics handle for test servers
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics handle shared by all test servers in this process.
///
/// The first caller installs the global recorder; if something else already
/// did, a standalone recorder's handle is used instead.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Backend responder that reports the request it received as JSON.
///
/// Response body:
/// ```json
/// {"method": "GET", "path": "/x", "query": "a=1", "headers": {"name": "value"}, "body": "..."}
/// ```
/// Repeated headers are joined with `, `.
pub struct EchoRequest;

impl Respond for EchoRequest {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut headers = serde_json::Map::new();
        for (name, value) in &request.headers {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            let joined = match headers.remove(name.as_str()) {
                Some(serde_json::Value::String(existing)) => format!("{existing}, {value}"),
                _ => value,
            };
            headers.insert(name.as_str().to_string(), serde_json::Value::String(joined));
        }

        ResponseTemplate::new(200)
            .insert_header("x-backend", "echo")
            .set_body_json(serde_json::json!({
                "method": request.method.as_str(),
                "path": request.url.path(),
                "query": request.url.query(),
                "headers": headers,
                "body": String::from_utf8_lossy(&request.body),
            }))
    }
}

/// Test harness for spawning the gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_valid_token_reaches_backend() -> Result<()> {
///     let server = TestGatewayServer::spawn().await?;
///     let token = server.sign(&server.valid_claims());
///
///     let response = reqwest::Client::new()
///         .get(format!("{}/orders", server.url()))
///         .bearer_auth(token)
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    jwks_server: MockServer,
    backend: MockServer,
    keypair: TestKeypair,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway with default settings (plain header encoding, no
    /// extract keys, 60 second skew).
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(&[]).await
    }

    /// Spawn a gateway, overriding configuration variables.
    ///
    /// `overrides` are applied on top of the harness defaults, e.g.
    /// `&[("EXTRACT_KEYS", "sub,org.id"), ("PROXY_HEADER_VALUE_AS_JSON", "true")]`.
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Result<Self, anyhow::Error> {
        let keypair = TestKeypair::primary();

        let jwks_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&keypair])))
            .mount(&jwks_server)
            .await;

        let backend = MockServer::start().await;
        Mock::given(any())
            .respond_with(EchoRequest)
            .mount(&backend)
            .await;

        let mut vars = HashMap::from([
            ("AUTH0_DOMAIN".to_string(), TEST_DOMAIN.to_string()),
            ("AUTH0_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("BACKEND_URL".to_string(), backend.uri()),
            (
                "JWKS_URL".to_string(),
                format!("{}{}", jwks_server.uri(), JWKS_PATH),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::new(config.clone())
                .map_err(|e| anyhow::anyhow!("Failed to create app state: {}", e))?,
        );

        // Build routes using the gateway's real route builder
        let app = routes::build_routes(state, test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        // Spawn server in background
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            jwks_server,
            backend,
            keypair,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mocked JWKS endpoint.
    pub fn jwks_server(&self) -> &MockServer {
        &self.jwks_server
    }

    /// Mocked backend.
    pub fn backend(&self) -> &MockServer {
        &self.backend
    }

    /// Key published by the mocked JWKS endpoint.
    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    /// Sign claims with the published key.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        self.keypair.sign_token(claims)
    }

    /// Claims that pass every check, plus the nested sample claims.
    pub fn valid_claims(&self) -> serde_json::Value {
        let now = Utc::now().timestamp();
        serde_json::json!({
            "iss": TEST_ISSUER,
            "aud": TEST_AUDIENCE,
            "sub": "auth0|user-42",
            "iat": now,
            "exp": now + 3600,
            "key1": "value1",
            "key2": {"key2_depth1": "value2_depth1"},
            "key3": {"key3_depth1": {"key3_depth2": "value3_depth2"}}
        })
    }

    /// Number of requests that reached the backend.
    pub async fn backend_request_count(&self) -> usize {
        self.backend
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so the port is released when the test ends
        self._handle.abort();
    }
}
