use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gateway_crypto::fingerprint;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::info;

use crate::error::AuthError;
use crate::resource::canonicalize_resource;
use crate::state_machine::AuthStateMachine;

/// Tolerated clock skew when judging an introspection response's `iat`.
const MAX_IAT_SKEW_SECS: i64 = 60;

/// How this gateway verifies bearer tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `verifyAccessToken` calls the auth state machine directly.
    Embedded,
    /// `verifyAccessToken` calls an external RFC 7662 `/introspect` endpoint.
    External,
    /// This process only serves the OAuth surface, never the MCP transport.
    AuthOnly,
}

/// The outcome of a successful token verification, independent of which
/// verifier produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedToken {
    pub client_id: String,
    pub user_id: String,
    pub scopes: Vec<String>,
    pub expires_at: i64,
}

/// One contract, two implementations: embedded (in-process) and external
/// (RFC 7662 introspection over HTTP).
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str, resource: &str) -> Result<VerifiedToken, AuthError>;
}

/// Verifies by calling the auth state machine's own `Installation` lookup —
/// no network hop.
pub struct EmbeddedVerifier {
    state_machine: AuthStateMachine,
}

impl EmbeddedVerifier {
    pub fn new(state_machine: AuthStateMachine) -> Self {
        Self { state_machine }
    }
}

#[async_trait]
impl TokenVerifier for EmbeddedVerifier {
    async fn verify(&self, token: &str, resource: &str) -> Result<VerifiedToken, AuthError> {
        let installation = self.state_machine.verify_access_token(token).await?;

        if let Some(installed_resource) = &installation.resource {
            check_audience(installed_resource, resource)?;
        }

        Ok(VerifiedToken {
            expires_at: installation.expires_at(),
            client_id: installation.client_id,
            user_id: installation.user_id,
            // Fixed scope list regardless of what was actually stored — see
            // DESIGN.md's resolution of the embedded-verifier open question.
            scopes: vec!["mcp".to_string()],
        })
    }
}

/// Verifies by POSTing to an RFC 7662 introspection endpoint. Fails closed
/// on any transport error.
pub struct ExternalVerifier {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct IntrospectionRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: Option<serde_json::Value>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl ExternalVerifier {
    pub fn new(introspection_endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: introspection_endpoint.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TokenVerifier for ExternalVerifier {
    async fn verify(&self, token: &str, resource: &str) -> Result<VerifiedToken, AuthError> {
        let response = self
            .http
            .post(&self.endpoint)
            .form(&IntrospectionRequest { token })
            .send()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() {
            // The introspector understood us and said no.
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            return Err(AuthError::UpstreamUnavailable {
                reason: format!("introspection endpoint returned {status}"),
            });
        }

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::UpstreamUnavailable {
                reason: e.to_string(),
            })?;

        if !body.active {
            return Err(AuthError::InvalidToken);
        }

        let now = Utc::now().timestamp();
        if let Some(exp) = body.exp {
            if exp <= now {
                return Err(AuthError::InvalidToken);
            }
        }
        if let Some(nbf) = body.nbf {
            if nbf > now {
                return Err(AuthError::InvalidToken);
            }
        }
        if let Some(iat) = body.iat {
            if iat > now + MAX_IAT_SKEW_SECS {
                return Err(AuthError::InvalidToken);
            }
        }

        // Open question resolved (see DESIGN.md): a missing `aud` is
        // permissive, logged but not rejected, for back-compat with
        // introspection servers that predate resource indicators.
        match &body.aud {
            Some(aud) => check_audience_value(aud, resource)?,
            None => info!("introspection response omitted aud, accepting permissively"),
        }

        Ok(VerifiedToken {
            client_id: body.client_id.unwrap_or_default(),
            user_id: body.sub.unwrap_or_default(),
            scopes: body
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|| vec!["mcp".to_string()]),
            expires_at: body.exp.unwrap_or(now + 60),
        })
    }
}

fn check_audience(token_resource: &str, expected_resource: &str) -> Result<(), AuthError> {
    let expected = canonicalize_resource(expected_resource).map_err(|_| AuthError::InvalidToken)?;
    let matches: bool = token_resource.as_bytes().ct_eq(expected.as_bytes()).into();
    if matches {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}

fn check_audience_value(aud: &serde_json::Value, expected_resource: &str) -> Result<(), AuthError> {
    let candidates: Vec<&str> = match aud {
        serde_json::Value::String(s) => vec![s.as_str()],
        serde_json::Value::Array(values) => values.iter().filter_map(|v| v.as_str()).collect(),
        _ => vec![],
    };
    let expected = canonicalize_resource(expected_resource).map_err(|_| AuthError::InvalidToken)?;
    let matches = candidates
        .iter()
        .any(|c| bool::from(c.as_bytes().ct_eq(expected.as_bytes())));
    if matches {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}

/// Wraps any [`TokenVerifier`] with a validation cache keyed by token
/// fingerprint. The cache's own TTL is 60 seconds; a hit additionally
/// re-checks the cached verdict's `expires_at`, so a cached entry can never
/// outlive the token it vouches for.
pub struct CachingVerifier<V> {
    inner: V,
    cache: Cache<String, VerifiedToken>,
}

impl<V: TokenVerifier> CachingVerifier<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(60))
                .max_capacity(100_000)
                .build(),
        }
    }
}

#[async_trait]
impl<V: TokenVerifier> TokenVerifier for CachingVerifier<V> {
    async fn verify(&self, token: &str, resource: &str) -> Result<VerifiedToken, AuthError> {
        let key = fingerprint(token);

        if let Some(cached) = self.cache.get(&key).await {
            if cached.expires_at > Utc::now().timestamp() {
                return Ok(cached);
            }
            self.cache.invalidate(&key).await;
        }

        let verified = self.inner.verify(token, resource).await?;
        self.cache.insert(key, verified.clone()).await;
        Ok(verified)
    }
}
