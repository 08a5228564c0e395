//! Authentication integration tests.
//!
//! Drives the full gateway (mocked JWKS endpoint, echoing mocked backend)
//! and checks what the client sees and what the backend receives.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use gateway_test_utils::{TestGatewayServer, TestKeypair, TEST_AUDIENCE};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

/// Send `GET {server}/{path}` with an optional Authorization header value.
async fn get_with_auth(
    server: &TestGatewayServer,
    path: &str,
    authorization: Option<&str>,
) -> Result<reqwest::Response> {
    let mut request = reqwest::Client::new().get(format!("{}{}", server.url(), path));
    if let Some(value) = authorization {
        request = request.header("Authorization", value);
    }
    Ok(request.send().await?)
}

/// Send a bearer token and return the response.
async fn get_with_token(server: &TestGatewayServer, token: &str) -> Result<reqwest::Response> {
    let authorization = format!("Bearer {token}");
    get_with_auth(server, "/api/orders", Some(authorization.as_str())).await
}

/// Assert the generic rejection and that nothing reached the backend.
async fn assert_rejected(server: &TestGatewayServer, response: reqwest::Response) -> Result<()> {
    assert_eq!(response.status(), 401);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert!(response.headers().get("www-authenticate").is_some());
    assert_eq!(response.text().await?, r#"{"error": "Invalid token"}"#);
    assert_eq!(
        server.backend_request_count().await,
        0,
        "Rejected request must not reach the backend"
    );
    Ok(())
}

/// Header value the backend saw for the configured outbound header.
async fn forwarded_header(response: reqwest::Response, name: &str) -> Result<Value> {
    assert_eq!(response.status(), 200);
    let echo: Value = response.json().await?;
    Ok(echo["headers"][name].clone())
}

fn with_claim(mut claims: Value, name: &str, value: Value) -> Value {
    claims[name] = value;
    claims
}

// =============================================================================
// Missing / malformed Authorization header
// =============================================================================

#[tokio::test]
async fn test_missing_authorization_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;

    let response = get_with_auth(&server, "/api/orders", None).await?;

    assert_rejected(&server, response).await
}

#[tokio::test]
async fn test_non_bearer_scheme_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;

    let response = get_with_auth(&server, "/api/orders", Some("Basic dXNlcjpwYXNz")).await?;

    assert_rejected(&server, response).await
}

#[tokio::test]
async fn test_bearer_without_token_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;

    let response = get_with_auth(&server, "/api/orders", Some("Bearer")).await?;

    assert_rejected(&server, response).await
}

#[tokio::test]
async fn test_lowercase_bearer_scheme_accepted() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let token = server.sign(&server.valid_claims());

    let authorization = format!("bearer {token}");
    let response = get_with_auth(&server, "/api/orders", Some(authorization.as_str())).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

// =============================================================================
// Forwarding and claim header
// =============================================================================

#[tokio::test]
async fn test_valid_token_forwards_request_unchanged() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let token = server.sign(&server.valid_claims());

    let response = reqwest::Client::new()
        .post(format!("{}/api/orders/42?expand=items", server.url()))
        .bearer_auth(&token)
        .header("x-request-id", "req-1")
        .body("order payload")
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("x-backend").unwrap(), "echo");

    let echo: Value = response.json().await?;
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["path"], "/api/orders/42");
    assert_eq!(echo["query"], "expand=items");
    assert_eq!(echo["body"], "order payload");
    assert_eq!(echo["headers"]["x-request-id"], "req-1");
    assert_eq!(echo["headers"]["authorization"], format!("Bearer {token}"));
    assert_eq!(server.backend_request_count().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_no_extract_keys_forwards_whole_tree_as_plain_text() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let token = server.sign(&server.valid_claims());

    let header = forwarded_header(get_with_token(&server, &token).await?, "x-auth0-user").await?;
    let header = header.as_str().unwrap();

    assert!(header.starts_with("map[iss:https://tenant.test.local/ "), "{header}");
    assert!(header.contains(" key1:value1 "), "{header}");
    assert!(header.contains(" key2:map[key2_depth1:value2_depth1] "), "{header}");
    assert!(
        header.ends_with(" key3:map[key3_depth1:map[key3_depth2:value3_depth2]]]"),
        "{header}"
    );

    Ok(())
}

#[tokio::test]
async fn test_no_extract_keys_forwards_whole_tree_as_json() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[("PROXY_HEADER_VALUE_AS_JSON", "true")]).await?;
    let claims = server.valid_claims();
    let token = server.sign(&claims);

    let header = forwarded_header(get_with_token(&server, &token).await?, "x-auth0-user").await?;
    let forwarded: Value = serde_json::from_str(header.as_str().unwrap())?;

    assert_eq!(forwarded, claims);
    Ok(())
}

#[tokio::test]
async fn test_single_key_plain_text() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[("EXTRACT_KEYS", "key1")]).await?;
    let token = server.sign(&server.valid_claims());

    let header = forwarded_header(get_with_token(&server, &token).await?, "x-auth0-user").await?;

    assert_eq!(header, "value1");
    Ok(())
}

#[tokio::test]
async fn test_single_nested_key_json() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[
        ("EXTRACT_KEYS", "key3.key3_depth1.key3_depth2"),
        ("PROXY_HEADER_VALUE_AS_JSON", "true"),
    ])
    .await?;
    let token = server.sign(&server.valid_claims());

    let header = forwarded_header(get_with_token(&server, &token).await?, "x-auth0-user").await?;

    assert_eq!(header, r#""value3_depth2""#);
    Ok(())
}

#[tokio::test]
async fn test_multiple_keys_json_keyed_by_path() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[
        ("EXTRACT_KEYS", "key1,key2.key2_depth1"),
        ("PROXY_HEADER_VALUE_AS_JSON", "true"),
    ])
    .await?;
    let token = server.sign(&server.valid_claims());

    let header = forwarded_header(get_with_token(&server, &token).await?, "x-auth0-user").await?;

    assert_eq!(
        header,
        r#"{"key1":"value1","key2.key2_depth1":"value2_depth1"}"#
    );
    Ok(())
}

#[tokio::test]
async fn test_multiple_keys_plain_text_with_missing_claim() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[("EXTRACT_KEYS", "key1, key2, org.id")]).await?;
    let token = server.sign(&server.valid_claims());

    let header = forwarded_header(get_with_token(&server, &token).await?, "x-auth0-user").await?;

    assert_eq!(
        header,
        "map[key1:value1 key2:map[key2_depth1:value2_depth1] org.id:nil]"
    );
    Ok(())
}

#[tokio::test]
async fn test_client_supplied_header_is_overwritten() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[("EXTRACT_KEYS", "sub")]).await?;
    let token = server.sign(&server.valid_claims());

    let response = reqwest::Client::new()
        .get(format!("{}/api/orders", server.url()))
        .bearer_auth(&token)
        .header("X-Auth0-User", "admin")
        .header("X-Auth0-User", "root")
        .send()
        .await?;

    let header = forwarded_header(response, "x-auth0-user").await?;
    assert_eq!(header, "auth0|user-42");
    Ok(())
}

#[tokio::test]
async fn test_custom_header_name() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[
        ("PROXY_HEADER_NAME", "X-Authenticated-Subject"),
        ("EXTRACT_KEYS", "sub"),
    ])
    .await?;
    let token = server.sign(&server.valid_claims());

    let response = get_with_token(&server, &token).await?;
    let echo: Value = response.json().await?;

    assert_eq!(echo["headers"]["x-authenticated-subject"], "auth0|user-42");
    assert!(echo["headers"].get("x-auth0-user").is_none());
    Ok(())
}

#[tokio::test]
async fn test_non_ascii_claim_forwarded() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[
        ("EXTRACT_KEYS", "name"),
        ("PROXY_HEADER_VALUE_AS_JSON", "true"),
    ])
    .await?;
    let claims = with_claim(server.valid_claims(), "name", json!("Zoë"));
    let token = server.sign(&claims);

    let header = forwarded_header(get_with_token(&server, &token).await?, "x-auth0-user").await?;

    assert_eq!(header, "\"Zoë\"");
    Ok(())
}

#[tokio::test]
async fn test_claim_with_control_character_is_internal_error() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[("EXTRACT_KEYS", "note")]).await?;
    let claims = with_claim(server.valid_claims(), "note", json!("line1\nline2"));
    let token = server.sign(&claims);

    let response = get_with_token(&server, &token).await?;

    assert_eq!(response.status(), 500);
    assert_eq!(server.backend_request_count().await, 0);
    Ok(())
}

// =============================================================================
// Issuer and audience
// =============================================================================

#[tokio::test]
async fn test_wrong_issuer_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let claims = with_claim(server.valid_claims(), "iss", json!("https://evil.test.local/"));
    let token = server.sign(&claims);

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

#[tokio::test]
async fn test_issuer_without_trailing_slash_accepted() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let claims = with_claim(server.valid_claims(), "iss", json!("https://tenant.test.local"));
    let token = server.sign(&claims);

    let response = get_with_token(&server, &token).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_wrong_audience_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let claims = with_claim(server.valid_claims(), "aud", json!("https://other-api.test.local"));
    let token = server.sign(&claims);

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

#[tokio::test]
async fn test_audience_array_containing_expected_accepted() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let claims = with_claim(
        server.valid_claims(),
        "aud",
        json!([TEST_AUDIENCE, "https://tenant.test.local/userinfo"]),
    );
    let token = server.sign(&claims);

    let response = get_with_token(&server, &token).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

// =============================================================================
// Time claims and clock skew
// =============================================================================

#[tokio::test]
async fn test_expired_beyond_skew_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let now = Utc::now().timestamp();
    let claims = with_claim(server.valid_claims(), "exp", json!(now - 120));
    let token = server.sign(&claims);

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

#[tokio::test]
async fn test_expired_within_skew_accepted() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let now = Utc::now().timestamp();
    let claims = with_claim(server.valid_claims(), "exp", json!(now - 30));
    let token = server.sign(&claims);

    let response = get_with_token(&server, &token).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_not_before_beyond_skew_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let now = Utc::now().timestamp();
    let claims = with_claim(server.valid_claims(), "nbf", json!(now + 120));
    let token = server.sign(&claims);

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

#[tokio::test]
async fn test_not_before_within_skew_accepted() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let now = Utc::now().timestamp();
    let claims = with_claim(server.valid_claims(), "nbf", json!(now + 30));
    let token = server.sign(&claims);

    let response = get_with_token(&server, &token).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_future_iat_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let now = Utc::now().timestamp();
    let claims = with_claim(server.valid_claims(), "iat", json!(now + 3600));
    let token = server.sign(&claims);

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

#[tokio::test]
async fn test_configured_skew_is_applied() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[("JWT_CLOCK_SKEW_SECONDS", "300")]).await?;
    let now = Utc::now().timestamp();
    let claims = with_claim(server.valid_claims(), "exp", json!(now - 120));
    let token = server.sign(&claims);

    let response = get_with_token(&server, &token).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

// =============================================================================
// Signature and key resolution
// =============================================================================

#[tokio::test]
async fn test_token_signed_by_unpublished_key_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    // Same kid as the published key, different private key
    let forger = TestKeypair::secondary_with_kid(server.keypair().kid());
    let token = forger.sign_token(&server.valid_claims());

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

#[tokio::test]
async fn test_unknown_kid_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let token = TestKeypair::secondary().sign_token(&server.valid_claims());

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

#[tokio::test]
async fn test_tampered_payload_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let token = server.sign(&server.valid_claims());

    let mut parts: Vec<&str> = token.split('.').collect();
    let forged_claims = with_claim(server.valid_claims(), "sub", json!("auth0|admin"));
    let forged_payload = URL_SAFE_NO_PAD.encode(forged_claims.to_string());
    parts[1] = &forged_payload;
    let tampered = parts.join(".");

    assert_rejected(&server, get_with_token(&server, &tampered).await?).await
}

#[tokio::test]
async fn test_jwks_unavailable_rejected() -> Result<()> {
    let server =
        TestGatewayServer::spawn_with(&[("JWKS_URL", "http://127.0.0.1:1/.well-known/jwks.json")])
            .await?;
    let token = server.sign(&server.valid_claims());

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

// =============================================================================
// Malformed tokens and algorithm confusion
// =============================================================================

#[tokio::test]
async fn test_malformed_token_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;

    assert_rejected(&server, get_with_token(&server, "not-a-jwt").await?).await?;
    assert_rejected(&server, get_with_token(&server, "a.b.c").await?).await
}

#[tokio::test]
async fn test_oversized_token_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;

    let response = get_with_token(&server, &"a".repeat(8193)).await?;

    assert_rejected(&server, response).await
}

#[tokio::test]
async fn test_large_token_within_limit_accepted() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;
    let claims = with_claim(server.valid_claims(), "padding", json!("x".repeat(5000)));
    let token = server.sign(&claims);
    assert!(token.len() <= 8192, "token is {} bytes", token.len());

    let response = get_with_token(&server, &token).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_token_with_alg_none_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;

    let header = r#"{"alg":"none","typ":"JWT","kid":"test-key-01"}"#;
    let header_b64 = URL_SAFE_NO_PAD.encode(header.as_bytes());
    let claims_b64 = URL_SAFE_NO_PAD.encode(server.valid_claims().to_string());
    let malicious_token = format!("{header_b64}.{claims_b64}.");

    assert_rejected(&server, get_with_token(&server, &malicious_token).await?).await
}

#[tokio::test]
async fn test_token_with_alg_hs256_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;

    // Attacker signs with HMAC using the published modulus as the secret
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(server.keypair().kid().to_string());
    let secret = server.keypair().jwk_json()["n"].as_str().unwrap().to_string();
    let malicious_token = encode(
        &header,
        &server.valid_claims(),
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    assert_rejected(&server, get_with_token(&server, &malicious_token).await?).await
}

#[tokio::test]
async fn test_token_with_other_rsa_algorithm_rejected() -> Result<()> {
    let server = TestGatewayServer::spawn().await?;

    let mut header = Header::new(Algorithm::RS512);
    header.kid = Some(server.keypair().kid().to_string());
    let token = server.keypair().sign_with_header(&header, &server.valid_claims());

    assert_rejected(&server, get_with_token(&server, &token).await?).await
}

// =============================================================================
// Backend failures
// =============================================================================

#[tokio::test]
async fn test_unreachable_backend_returns_502() -> Result<()> {
    let server = TestGatewayServer::spawn_with(&[("BACKEND_URL", "http://127.0.0.1:1")]).await?;
    let token = server.sign(&server.valid_claims());

    let response = get_with_token(&server, &token).await?;

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "Bad gateway");
    Ok(())
}
