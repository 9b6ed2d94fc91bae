use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gateway_auth::{AuthMode, TokenVerifier};
use gateway_crypto::fingerprint;
use tracing::info;

use crate::context::{with_auth_context, AuthContext, RequestContext};
use crate::error::GatewayError;
use crate::state::AppState;

/// Gate every MCP-transport request through bearer-token verification. On
/// success the request runs inside a task-local [`AuthContext`] scope (and
/// gets a [`RequestContext`] extension); on failure it is rejected outright
/// with a 401 carrying `WWW-Authenticate` that points back at this
/// resource's protected-resource metadata, per RFC 9728.
pub async fn require_bearer(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let outcome: Result<AuthContext, GatewayError> = async {
        let token = extract_bearer(&request).ok_or_else(|| {
            info!("request missing bearer token");
            GatewayError::Unauthorized
        })?;

        let verified = state
            .verifier
            .verify(&token, &state.canonical_resource)
            .await
            .map_err(|err| {
                info!(token_fp = %fingerprint(&token)[..16], "bearer verification failed");
                GatewayError::Auth(err)
            })?;

        // Embedded mode additionally loads the installation so downstream
        // handlers can reach the upstream IdP state. A token that verifies
        // but has no installation has been revoked out from under a cached
        // verdict.
        let upstream_installation = match state.auth_mode {
            AuthMode::Embedded => {
                let installation = state.auth.verify_access_token(&token).await.map_err(|err| {
                    info!(token_fp = %fingerprint(&token)[..16], "installation lookup failed after verification");
                    GatewayError::Auth(err)
                })?;
                Some(installation.upstream_installation)
            }
            _ => None,
        };

        Ok(AuthContext {
            access_token: token,
            verified,
            upstream_installation,
        })
    }
    .await;

    match outcome {
        Ok(ctx) => {
            request.extensions_mut().insert(RequestContext {
                access_token_fingerprint: fingerprint(&ctx.access_token),
                verified: ctx.verified.clone(),
            });
            with_auth_context(ctx, next.run(request)).await
        }
        Err(err) => {
            let mut response = err.into_response();
            if response.status() == StatusCode::UNAUTHORIZED {
                let value = format!(
                    r#"Bearer resource_metadata="{}/.well-known/oauth-protected-resource", error="invalid_token""#,
                    state.base_uri.trim_end_matches('/')
                );
                if let Ok(header_value) = HeaderValue::from_str(&value) {
                    response.headers_mut().insert(WWW_AUTHENTICATE, header_value);
                }
            }
            response
        }
    }
}

fn extract_bearer(request: &Request) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::to_string)
}
