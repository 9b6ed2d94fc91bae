use std::marker::PhantomData;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::EncryptedKv;
use crate::Result;

/// 30 days — how long a dynamically registered client stays registered.
pub const CLIENT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// 10 minutes — the window to complete the upstream IdP detour.
pub const PENDING_TTL: Duration = Duration::from_secs(10 * 60);
/// 10 minutes — the window to exchange an authorization code for tokens.
pub const EXCHANGE_TTL: Duration = Duration::from_secs(10 * 60);
/// 7 days — how long an `Installation` record stays resident. The access
/// token inside it expires much sooner; `expires_in` is the authoritative
/// guard, residency is not.
pub const INSTALLATION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// 7 days — how long a refresh token remains usable.
pub const REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A record class whose values are encrypted at rest under the lookup token
/// itself: stored at `{prefix}:{sha256(token)}`, value
/// `AES-256-CBC(JSON, token-as-key)`. Holding the KV contents without the
/// token yields neither the record nor the token.
pub struct SecretRecord<T> {
    prefix: &'static str,
    ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> SecretRecord<T> {
    pub const fn new(prefix: &'static str, ttl: Duration) -> Self {
        Self {
            prefix,
            ttl,
            _marker: PhantomData,
        }
    }

    pub async fn save(&self, kv: &EncryptedKv, token: &str, value: &T) -> Result<()> {
        kv.save_secret(self.prefix, token, value, self.ttl).await
    }

    pub async fn read(&self, kv: &EncryptedKv, token: &str) -> Result<Option<T>> {
        kv.read_secret(self.prefix, token).await
    }

    /// Atomically read and delete — the single-use consumption primitive for
    /// refresh tokens.
    pub async fn take(&self, kv: &EncryptedKv, token: &str) -> Result<Option<T>> {
        kv.take_secret(self.prefix, token).await
    }

    /// Atomically rewrite the record, preserving its TTL, and return what was
    /// there before. A racing second caller observes the first caller's
    /// write, not the original — the replay-detection primitive for
    /// authorization codes.
    pub async fn exchange(&self, kv: &EncryptedKv, token: &str, new_value: &T) -> Result<Option<T>> {
        kv.exchange_secret(self.prefix, token, new_value).await
    }

    pub async fn delete(&self, kv: &EncryptedKv, token: &str) -> Result<()> {
        kv.delete_secret(self.prefix, token).await
    }
}

/// `auth:pending:{sha256(authCode)}`, encrypted under the code, 10 minutes.
pub const PENDING_AUTHORIZATIONS: SecretRecord<PendingAuthorization> =
    SecretRecord::new("auth:pending", PENDING_TTL);

/// `auth:exch:{sha256(authCode)}`, encrypted under the code, 10 minutes.
pub const TOKEN_EXCHANGES: SecretRecord<TokenExchange> =
    SecretRecord::new("auth:exch", EXCHANGE_TTL);

/// `auth:installation:{sha256(accessToken)}`, encrypted under the access
/// token, 7 days.
pub const INSTALLATIONS: SecretRecord<Installation> =
    SecretRecord::new("auth:installation", INSTALLATION_TTL);

/// `auth:refresh:{sha256(refreshToken)}`, encrypted under the refresh token,
/// 7 days. The value is the access token whose installation this refresh
/// token can rotate — an opaque pointer, nothing more.
pub const REFRESH_INDEX: SecretRecord<String> = SecretRecord::new("auth:refresh", REFRESH_TTL);

/// `auth:client:{client_id}` — plaintext JSON, 30 day TTL.
pub fn client_key(client_id: &str) -> String {
    format!("auth:client:{client_id}")
}

/// `session:owner:{sessionId}` — plaintext user id, lives until the session
/// is torn down.
pub fn session_owner_key(session_id: &str) -> String {
    format!("session:owner:{session_id}")
}

/// A dynamically registered OAuth client (RFC 7591).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub client_uri: Option<String>,
    pub client_secret: Option<String>,
}

/// Created at `/authorize`, keyed by the freshly minted authorization code,
/// while the user agent detours through the upstream IdP. The code itself
/// doubles as the `state` correlator carried to the IdP and back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub resource: Option<String>,
    pub state: Option<String>,
}

/// Written at upstream-callback success, binding the authorization code to
/// the access token that was minted for it. Consumed exactly once at
/// `/token` via compare-and-swap on `already_used`; a second winner is a
/// replay and costs the bound installation its life.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenExchange {
    pub mcp_access_token: String,
    pub already_used: bool,
}

/// The token triple handed to the client at `/token`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// The authoritative user-session record, keyed by its own access token.
/// Mutated only by refresh rotation, which writes a successor under the new
/// access token and retires this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Installation {
    /// Whatever the upstream IdP handed back for this user — opaque here.
    pub upstream_installation: Value,
    pub mcp_tokens: McpTokens,
    pub client_id: String,
    pub user_id: String,
    pub resource: Option<String>,
    /// Unix seconds. `issued_at + mcp_tokens.expires_in` is the token's hard
    /// expiry, enforced by verifiers regardless of KV residency.
    pub issued_at: i64,
}

impl Installation {
    pub fn expires_at(&self) -> i64 {
        self.issued_at + self.mcp_tokens.expires_in as i64
    }
}
