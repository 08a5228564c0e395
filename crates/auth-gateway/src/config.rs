//! Auth Gateway configuration.
//!
//! Configuration is loaded once at startup from environment variables and is
//! never re-read per request.

use axum::http::HeaderName;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default outbound header carrying the extracted claims.
pub const DEFAULT_PROXY_HEADER_NAME: &str = "X-Auth0-User";

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Path of the key set relative to the issuer URL.
const JWKS_PATH: &str = ".well-known/jwks.json";

/// Auth Gateway configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Identity provider domain, e.g. "tenant.eu.auth0.com".
    pub auth0_domain: String,

    /// Audience every accepted token must carry.
    pub auth0_audience: String,

    /// URL of the identity provider's JSON Web Key Set.
    pub jwks_url: String,

    /// Header set on forwarded requests (default: "X-Auth0-User").
    pub proxy_header_name: HeaderName,

    /// Encode the forwarded header value as JSON instead of plain text.
    pub proxy_header_value_as_json: bool,

    /// Dotted key-paths to extract from the claims, in configured order.
    /// Empty means "forward the whole claim set".
    pub extract_keys: Vec<String>,

    /// Base URL of the protected backend.
    pub backend_url: String,

    /// Clock skew tolerance for `exp`, `nbf` and `iat`.
    pub jwt_clock_skew: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid identity provider domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid proxy header name: {0}")]
    InvalidHeaderName(String),

    #[error("Invalid boolean for {0}")]
    InvalidBool(String),

    #[error("Invalid backend URL: {0}")]
    InvalidBackendUrl(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let auth0_domain = required(vars, "AUTH0_DOMAIN")?
            .trim()
            .trim_end_matches('/')
            .to_string();
        if auth0_domain.is_empty() {
            return Err(ConfigError::MissingEnvVar("AUTH0_DOMAIN".to_string()));
        }
        if auth0_domain.contains("://") || auth0_domain.contains('/') {
            return Err(ConfigError::InvalidDomain(format!(
                "AUTH0_DOMAIN must be a bare host name, got '{}'",
                auth0_domain
            )));
        }

        let auth0_audience = required(vars, "AUTH0_AUDIENCE")?.trim().to_string();
        if auth0_audience.is_empty() {
            return Err(ConfigError::MissingEnvVar("AUTH0_AUDIENCE".to_string()));
        }

        let backend_url = required(vars, "BACKEND_URL")?
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBackendUrl(format!(
                "BACKEND_URL must start with http:// or https://, got '{}'",
                backend_url
            )));
        }

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_url = vars
            .get("JWKS_URL")
            .cloned()
            .unwrap_or_else(|| format!("{}{}", issuer_url_for(&auth0_domain), JWKS_PATH));

        let header_name = vars
            .get("PROXY_HEADER_NAME")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PROXY_HEADER_NAME);
        let proxy_header_name = HeaderName::try_from(header_name).map_err(|e| {
            ConfigError::InvalidHeaderName(format!("'{}': {}", header_name, e))
        })?;

        let proxy_header_value_as_json = match vars.get("PROXY_HEADER_VALUE_AS_JSON") {
            Some(value) => parse_bool(value)
                .ok_or_else(|| ConfigError::InvalidBool("PROXY_HEADER_VALUE_AS_JSON".to_string()))?,
            None => false,
        };

        let extract_keys = vars
            .get("EXTRACT_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value.unsigned_abs() > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value.unsigned_abs())
        } else {
            DEFAULT_CLOCK_SKEW
        };

        Ok(Config {
            bind_address,
            auth0_domain,
            auth0_audience,
            jwks_url,
            proxy_header_name,
            proxy_header_value_as_json,
            extract_keys,
            backend_url,
            jwt_clock_skew,
        })
    }

    /// Issuer every accepted token must name: `https://{domain}/`.
    pub fn issuer_url(&self) -> String {
        issuer_url_for(&self.auth0_domain)
    }
}

fn issuer_url_for(domain: &str) -> String {
    format!("https://{}/", domain)
}

fn required<'a>(vars: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ConfigError> {
    vars.get(name)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}
