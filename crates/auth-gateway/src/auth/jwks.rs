//! JWKS client for fetching and caching the identity provider's signing keys.
//!
//! The JWKS (JSON Web Key Set) client fetches public keys from the identity
//! provider's `/.well-known/jwks.json` endpoint and caches the parsed
//! verification keys for a fixed TTL.
//!
//! # Security
//!
//! - Keys are cached to avoid a network round-trip per request
//! - Cache is invalidated on TTL expiry to pick up key rotations and revocations
//! - Only RSA signing keys are kept; anything else in the set is ignored

use crate::observability::metrics::record_jwks_refresh;
use async_trait::async_trait;
use common::jwt::JwtValidationError;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Cache TTL in seconds (5 minutes).
pub const JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Timeout for a single JWKS fetch.
const JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Resolves a token's key ID to a verification key.
///
/// Implementations must be safe to call concurrently from many requests.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Return the verification key for `kid`.
    ///
    /// # Errors
    ///
    /// Returns `JwtValidationError::KeyResolution` if the key is unknown or
    /// the key set cannot be obtained.
    async fn resolve_key(&self, kid: &str) -> Result<DecodingKey, JwtValidationError>;
}

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for RS256 keys).
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url encoded).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm (should be "RS256" when present).
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" when present).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

impl Jwk {
    /// Convert to a verification key if this is a usable RS256 signing key.
    ///
    /// Returns `None` for keys that cannot verify RS256 signatures.
    pub fn to_decoding_key(&self) -> Option<DecodingKey> {
        if self.kty != "RSA" {
            return None;
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return None;
        }
        if self.alg.as_deref().is_some_and(|a| a != "RS256") {
            return None;
        }

        let (n, e) = (self.n.as_deref()?, self.e.as_deref()?);
        DecodingKey::from_rsa_components(n, e).ok()
    }
}

/// JWKS response from the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Cached verification keys with fetch time.
struct CachedKeys {
    /// Map of key ID to verification key.
    keys: HashMap<String, DecodingKey>,

    /// When this key set was fetched.
    fetched_at: Instant,
}

/// JWKS client for fetching and caching public keys.
///
/// Reads share a `RwLock`; refreshes additionally take `refresh_lock` so
/// that concurrent misses trigger a single fetch. Requests that queued behind
/// a failed fetch fail with it instead of fetching again.
pub struct JwksClient {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Cached key set.
    cache: RwLock<Option<CachedKeys>>,

    /// Serializes refreshes. Holds whether the last attempt failed.
    refresh_lock: Mutex<bool>,

    /// Completed refresh attempts, successful or not.
    refresh_attempts: AtomicU64,

    /// Cache TTL duration.
    cache_ttl: Duration,
}

impl JwksClient {
    /// Create a new JWKS client with the standard 5 minute cache TTL.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL to the identity provider's JWKS endpoint
    pub fn new(jwks_url: String) -> Self {
        Self::with_ttl(jwks_url, Duration::from_secs(JWKS_CACHE_TTL_SECONDS))
    }

    /// Create a new JWKS client with a custom cache TTL.
    pub fn with_ttl(jwks_url: String, cache_ttl: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(JWKS_FETCH_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gw.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(false),
            refresh_attempts: AtomicU64::new(0),
            cache_ttl,
        }
    }

    /// Whether a key set younger than the TTL is cached.
    pub async fn is_warm(&self) -> bool {
        self.cache
            .read()
            .await
            .as_ref()
            .is_some_and(|cached| cached.fetched_at.elapsed() < self.cache_ttl)
    }

    /// Look up `kid` in the cache.
    ///
    /// `None` means the cache is empty or stale; `Some(None)` means the cache
    /// is fresh but does not contain the key.
    async fn cached_key(&self, kid: &str) -> Option<Option<DecodingKey>> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        if cached.fetched_at.elapsed() >= self.cache_ttl {
            return None;
        }
        Some(cached.keys.get(kid).cloned())
    }

    /// Refresh the cache unless another task already did while we waited.
    async fn refresh_if_stale(&self) -> Result<(), JwtValidationError> {
        let attempts_seen = self.refresh_attempts.load(Ordering::Acquire);
        let mut last_failed = self.refresh_lock.lock().await;
        if self.is_warm().await {
            tracing::debug!(target: "gw.auth.jwks", "JWKS refreshed by concurrent request");
            return Ok(());
        }
        if *last_failed && self.refresh_attempts.load(Ordering::Acquire) != attempts_seen {
            tracing::debug!(target: "gw.auth.jwks", "JWKS refresh failed while waiting");
            return Err(JwtValidationError::KeyResolution(
                "JWKS fetch failed".to_string(),
            ));
        }
        self.attempt_refresh(&mut last_failed).await
    }

    /// Run one refresh while holding `refresh_lock`, recording its outcome.
    async fn attempt_refresh(&self, last_failed: &mut bool) -> Result<(), JwtValidationError> {
        let result = self.refresh_cache().await;
        *last_failed = result.is_err();
        self.refresh_attempts.fetch_add(1, Ordering::Release);
        result
    }

    /// Fetch the key set and replace the cache.
    #[instrument(skip(self))]
    async fn refresh_cache(&self) -> Result<(), JwtValidationError> {
        tracing::debug!(target: "gw.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let result = self.fetch_keys().await;
        record_jwks_refresh(result.is_ok());
        let keys = result?;

        tracing::info!(
            target: "gw.auth.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }

    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, JwtValidationError> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to fetch JWKS");
                JwtValidationError::KeyResolution("JWKS fetch failed".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gw.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(JwtValidationError::KeyResolution(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to parse JWKS response");
            JwtValidationError::KeyResolution("JWKS response unparsable".to_string())
        })?;

        let keys = jwks
            .keys
            .iter()
            .filter_map(|jwk| {
                let kid = jwk.kid.clone()?;
                match jwk.to_decoding_key() {
                    Some(key) => Some((kid, key)),
                    None => {
                        tracing::warn!(target: "gw.auth.jwks", kid = %kid, kty = %jwk.kty, "Skipping unusable JWK");
                        None
                    }
                }
            })
            .collect();

        Ok(keys)
    }

    /// Force refresh the cache.
    ///
    /// Used by the readiness probe when the cache is cold.
    pub async fn force_refresh(&self) -> Result<(), JwtValidationError> {
        let mut last_failed = self.refresh_lock.lock().await;
        self.attempt_refresh(&mut last_failed).await
    }
}

#[async_trait]
impl KeyProvider for JwksClient {
    /// Returns the cached key if found, or fetches the key set when the
    /// cache is expired or empty.
    #[instrument(skip(self), fields(kid = %kid))]
    async fn resolve_key(&self, kid: &str) -> Result<DecodingKey, JwtValidationError> {
        match self.cached_key(kid).await {
            Some(Some(key)) => {
                tracing::debug!(target: "gw.auth.jwks", kid = %kid, "JWKS cache hit");
                return Ok(key);
            }
            Some(None) => {
                tracing::debug!(target: "gw.auth.jwks", kid = %kid, "Key not found in JWKS cache");
                return Err(JwtValidationError::KeyResolution(
                    "unknown key id".to_string(),
                ));
            }
            None => {}
        }

        // Cache miss or expired - fetch fresh JWKS
        self.refresh_if_stale().await?;

        match self.cached_key(kid).await {
            Some(Some(key)) => Ok(key),
            _ => {
                tracing::warn!(target: "gw.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
                Err(JwtValidationError::KeyResolution(
                    "unknown key id".to_string(),
                ))
            }
        }
    }
}
