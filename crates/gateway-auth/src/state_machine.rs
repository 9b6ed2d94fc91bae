use std::sync::Arc;

use chrono::Utc;
use gateway_crypto::{fingerprint, generate_token, verify_pkce};
use gateway_kv::{
    client_key, ClientRegistration, EncryptedKv, Installation, McpTokens, PendingAuthorization,
    TokenExchange, INSTALLATIONS, PENDING_AUTHORIZATIONS, REFRESH_INDEX, TOKEN_EXCHANGES,
};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::error::AuthError;
use crate::resource::canonicalize_resource;

/// Issued access tokens are good for one hour. The backing `Installation`
/// record outlives that by days so refresh rotation keeps working; the
/// `expires_in` check is the authoritative expiry guard, not KV residency.
pub const ACCESS_TOKEN_EXPIRES_IN: u64 = 3600;

/// INIT → PENDING → EXCHANGEABLE → ACTIVE/ACTIVE' → REVOKED authorization
/// state machine, backed by the encrypted KV store's atomic exchange and
/// take primitives.
#[derive(Clone)]
pub struct AuthStateMachine {
    kv: Arc<EncryptedKv>,
}

/// Parameters for `/authorize` (the INIT → PENDING transition).
pub struct StartAuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub resource: Option<String>,
    pub state: Option<String>,
}

/// Parameters for the `authorization_code` grant at `/token`.
pub struct ExchangeCodeRequest {
    pub code: String,
    pub code_verifier: String,
    pub client_id: String,
    pub resource: Option<String>,
}

/// What the upstream IdP callback hands back to its HTTP handler: where to
/// send the user agent, carrying the client's original `state`.
pub struct CompletedAuthorization {
    pub redirect_uri: String,
    pub client_state: Option<String>,
}

impl AuthStateMachine {
    pub fn new(kv: Arc<EncryptedKv>) -> Self {
        Self { kv }
    }

    /// `/authorize`: validate the request and park it as a
    /// `PendingAuthorization` while the user agent detours through the
    /// upstream IdP. Returns the freshly minted authorization code, which
    /// doubles as the `state` correlator carried to the IdP and back.
    #[instrument(skip(self, req), fields(client_id = %req.client_id))]
    pub async fn start_authorization(
        &self,
        req: StartAuthorizationRequest,
    ) -> Result<String, AuthError> {
        let client: ClientRegistration = self
            .kv
            .read_plain(&client_key(&req.client_id))
            .await?
            .ok_or_else(|| AuthError::InvalidClient {
                reason: format!("unknown client_id: {}", req.client_id),
            })?;

        if !client.redirect_uris.contains(&req.redirect_uri) {
            return Err(AuthError::InvalidClient {
                reason: "redirect_uri is not registered for this client".into(),
            });
        }

        let resource = req.resource.as_deref().map(canonicalize_resource).transpose()?;

        let auth_code = generate_token();
        let pending = PendingAuthorization {
            client_id: req.client_id,
            redirect_uri: req.redirect_uri,
            code_challenge: req.code_challenge,
            code_challenge_method: "S256".to_string(),
            resource,
            state: req.state,
        };

        PENDING_AUTHORIZATIONS.save(&self.kv, &auth_code, &pending).await?;

        Ok(auth_code)
    }

    /// PENDING → EXCHANGEABLE: the upstream IdP has vouched for `user_id`
    /// and redirected back with our authorization code as its `state`. Mint
    /// the MCP token pair now, store the `Installation` under the access
    /// token and the refresh index under the refresh token, and bind the
    /// authorization code to the access token via a single-use
    /// `TokenExchange` record. The client only ever learns the tokens later,
    /// at `/token`.
    #[instrument(skip(self, auth_code, upstream_installation))]
    pub async fn complete_upstream_authorization(
        &self,
        auth_code: &str,
        user_id: &str,
        upstream_installation: Value,
    ) -> Result<CompletedAuthorization, AuthError> {
        let pending = PENDING_AUTHORIZATIONS
            .read(&self.kv, auth_code)
            .await?
            .ok_or_else(|| AuthError::InvalidState)?;

        let tokens = self
            .mint_installation(
                &pending.client_id,
                user_id,
                pending.resource.clone(),
                upstream_installation,
            )
            .await?;

        let exchange = TokenExchange {
            mcp_access_token: tokens.access_token,
            already_used: false,
        };
        TOKEN_EXCHANGES.save(&self.kv, auth_code, &exchange).await?;

        Ok(CompletedAuthorization {
            redirect_uri: pending.redirect_uri,
            client_state: pending.state,
        })
    }

    /// Look up the PKCE challenge bound to an authorization code, verifying
    /// the caller is the client the code was issued to. Called by the
    /// `/token` handler before the exchange proper.
    #[instrument(skip(self, code))]
    pub async fn challenge_for_authorization_code(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<String, AuthError> {
        let pending = PENDING_AUTHORIZATIONS
            .read(&self.kv, code)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant {
                reason: "unknown or expired authorization code".into(),
            })?;

        if pending.client_id != client_id {
            return Err(AuthError::InvalidGrant {
                reason: "client_id does not match the authorization code".into(),
            });
        }

        Ok(pending.code_challenge)
    }

    /// EXCHANGEABLE → ACTIVE: the `authorization_code` grant. The code is
    /// single-use: consumption is a compare-and-swap on the `TokenExchange`
    /// record's `already_used` marker, so of two racing exchanges exactly
    /// one observes the pristine record. A detected replay revokes the
    /// installation the code was bound to — tokens already handed out
    /// through a replayed code cannot be trusted to only one holder.
    #[instrument(skip(self, req), fields(client_id = %req.client_id))]
    pub async fn exchange_authorization_code(
        &self,
        req: ExchangeCodeRequest,
    ) -> Result<McpTokens, AuthError> {
        let pending = PENDING_AUTHORIZATIONS
            .read(&self.kv, &req.code)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant {
                reason: "unknown or expired authorization code".into(),
            })?;
        if pending.client_id != req.client_id {
            return Err(AuthError::InvalidGrant {
                reason: "client_id does not match the authorization code".into(),
            });
        }
        if !verify_pkce(&req.code_verifier, &pending.code_challenge) {
            return Err(AuthError::InvalidGrant {
                reason: "code_verifier does not match the stored challenge".into(),
            });
        }
        if let Some(requested) = req.resource.as_deref() {
            let requested = canonicalize_resource(requested)?;
            if pending.resource.as_deref() != Some(requested.as_str()) {
                return Err(AuthError::InvalidGrant {
                    reason: "resource does not match the authorization request".into(),
                });
            }
        }

        let current = TOKEN_EXCHANGES
            .read(&self.kv, &req.code)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant {
                reason: "authorization code has no completed upstream authorization".into(),
            })?;
        if current.already_used {
            self.revoke_replayed_code(&req.code, &current.mcp_access_token).await;
            return Err(AuthError::ReplayDetected);
        }

        let marker = TokenExchange {
            mcp_access_token: current.mcp_access_token.clone(),
            already_used: true,
        };
        let previous = TOKEN_EXCHANGES.exchange(&self.kv, &req.code, &marker).await?;

        let exchange = match previous {
            None => {
                return Err(AuthError::InvalidGrant {
                    reason: "authorization code expired during exchange".into(),
                });
            }
            Some(prev) if prev.already_used => {
                self.revoke_replayed_code(&req.code, &prev.mcp_access_token).await;
                return Err(AuthError::ReplayDetected);
            }
            Some(prev) => prev,
        };

        let installation = INSTALLATIONS
            .read(&self.kv, &exchange.mcp_access_token)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant {
                reason: "installation for this authorization code is gone".into(),
            })?;

        Ok(installation.mcp_tokens)
    }

    /// ACTIVE → ACTIVE': the `refresh_token` grant. The refresh index is
    /// consumed with an atomic get-and-delete, so a refresh token is
    /// single-use and two concurrent rotations cannot both win. Rotation
    /// mints a fresh token pair, copies the installation's identity, and
    /// proactively retires the old access token's record.
    #[instrument(skip(self, refresh_token))]
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
        client_id: Option<&str>,
    ) -> Result<McpTokens, AuthError> {
        let old_access_token = REFRESH_INDEX
            .take(&self.kv, refresh_token)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant {
                reason: "unknown or expired refresh token".into(),
            })?;

        let old = INSTALLATIONS
            .read(&self.kv, &old_access_token)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant {
                reason: "installation for this refresh token is gone".into(),
            })?;

        if let Some(client_id) = client_id {
            if old.client_id != client_id {
                return Err(AuthError::InvalidGrant {
                    reason: "client_id does not match the refresh token".into(),
                });
            }
        }

        let tokens = self
            .mint_installation(
                &old.client_id,
                &old.user_id,
                old.resource.clone(),
                old.upstream_installation.clone(),
            )
            .await?;

        if let Err(e) = INSTALLATIONS.delete(&self.kv, &old_access_token).await {
            info!(error = %e, "failed to proactively retire the rotated-out installation, relying on expiry");
        }

        Ok(tokens)
    }

    /// `verifyAccessToken`: the embedded half of the token verifier seam.
    /// Absence and expiry are both `invalid_token`; `issued_at + expires_in`
    /// is checked even when the record is still resident.
    #[instrument(skip(self, token))]
    pub async fn verify_access_token(&self, token: &str) -> Result<Installation, AuthError> {
        let installation = INSTALLATIONS
            .read(&self.kv, token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if installation.expires_at() <= Utc::now().timestamp() {
            return Err(AuthError::InvalidToken);
        }

        Ok(installation)
    }

    /// `/revoke` (RFC 7009): hint-agnostic — the submitted token may be an
    /// access or a refresh token, and revoking either kills the whole
    /// installation along with its counterpart.
    #[instrument(skip(self, token))]
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        if let Some(access_token) = REFRESH_INDEX.take(&self.kv, token).await? {
            error!(token_fp = %fingerprint(token)[..16], "revoking installation by refresh token");
            INSTALLATIONS.delete(&self.kv, &access_token).await?;
            return Ok(());
        }

        if let Some(installation) = INSTALLATIONS.take(&self.kv, token).await? {
            error!(token_fp = %fingerprint(token)[..16], "revoking installation by access token");
            REFRESH_INDEX
                .delete(&self.kv, &installation.mcp_tokens.refresh_token)
                .await?;
        }
        Ok(())
    }

    async fn revoke_replayed_code(&self, code: &str, access_token: &str) {
        error!(code_fp = %fingerprint(code)[..16], "authorization code replay detected, revoking bound installation");
        match INSTALLATIONS.take(&self.kv, access_token).await {
            Ok(Some(installation)) => {
                if let Err(e) = REFRESH_INDEX
                    .delete(&self.kv, &installation.mcp_tokens.refresh_token)
                    .await
                {
                    warn!(error = %e, "failed to delete refresh index for replayed code");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to revoke installation for replayed code"),
        }
    }

    async fn mint_installation(
        &self,
        client_id: &str,
        user_id: &str,
        resource: Option<String>,
        upstream_installation: Value,
    ) -> Result<McpTokens, AuthError> {
        let tokens = McpTokens {
            access_token: generate_token(),
            refresh_token: generate_token(),
            expires_in: ACCESS_TOKEN_EXPIRES_IN,
        };

        let installation = Installation {
            upstream_installation,
            mcp_tokens: tokens.clone(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            resource,
            issued_at: Utc::now().timestamp(),
        };
        INSTALLATIONS
            .save(&self.kv, &tokens.access_token, &installation)
            .await?;

        REFRESH_INDEX
            .save(&self.kv, &tokens.refresh_token, &tokens.access_token)
            .await?;

        Ok(tokens)
    }
}
