use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use chrono::Utc;
use gateway_auth::{
    get_client, register_client, ExchangeCodeRequest, RegisterClientRequest,
    StartAuthorizationRequest,
};
use gateway_crypto::generate_token;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::GatewayError;
use crate::state::AppState;

/// `POST /register` (RFC 7591). The `client_secret` is returned exactly
/// once, here.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterClientRequest>,
) -> Result<Response, GatewayError> {
    let registration = register_client(&state.kv, req).await?;
    let body = Json(json!({
        "client_id": registration.client_id,
        "client_secret": registration.client_secret,
        "client_name": registration.client_name,
        "redirect_uris": registration.redirect_uris,
        "client_uri": registration.client_uri,
    }));
    Ok((StatusCode::CREATED, body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub response_type: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// `GET /authorize`: validate the request and render the consent page whose
/// "continue" link sends the user agent through the mock upstream IdP with
/// the freshly minted authorization code as its `state`.
///
/// Client identity and redirect URI are validated before anything else; a
/// failure there is answered directly with a 400 since the redirect target
/// cannot be trusted. Later failures redirect back to the client per RFC
/// 6749 §4.1.2.1.
pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response, GatewayError> {
    let client = get_client(&state.kv, &query.client_id).await?;
    if !client.redirect_uris.contains(&query.redirect_uri) {
        return Err(GatewayError::BadRequest(
            "redirect_uri is not registered for this client".into(),
        ));
    }

    if query.response_type.as_deref() != Some("code") {
        return Ok(error_redirect(&query.redirect_uri, "unsupported_response_type", query.state.as_deref()));
    }
    let Some(code_challenge) = query.code_challenge.filter(|c| !c.is_empty()) else {
        return Ok(error_redirect(&query.redirect_uri, "invalid_request", query.state.as_deref()));
    };
    if query.code_challenge_method.as_deref().unwrap_or("S256") != "S256" {
        return Ok(error_redirect(&query.redirect_uri, "invalid_request", query.state.as_deref()));
    }

    let auth_code = state
        .auth
        .start_authorization(StartAuthorizationRequest {
            client_id: query.client_id,
            redirect_uri: query.redirect_uri.clone(),
            code_challenge,
            resource: query.resource,
            state: query.state,
        })
        .await?;

    let continue_url = format!(
        "{}/mock-upstream-idp/authorize?state={auth_code}",
        state.base_uri.trim_end_matches('/')
    );
    let client_name = client.client_name.as_deref().unwrap_or("An MCP client");
    let page = consent_page(client_name, &query.redirect_uri, &continue_url);

    // The consent page carries its own CSP: inline styles are needed here
    // and nowhere else, and the page must never render framed or submit
    // anywhere but home.
    let mut response = Html(page).into_response();
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; style-src 'unsafe-inline'; script-src 'none'; \
             frame-ancestors 'none'; form-action 'self'",
        ),
    );
    Ok(response)
}

fn error_redirect(redirect_uri: &str, error: &str, client_state: Option<&str>) -> Response {
    let mut url = match Url::parse(redirect_uri) {
        Ok(url) => url,
        Err(_) => {
            return GatewayError::BadRequest("redirect_uri is not a valid URL".into()).into_response();
        }
    };
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("error", error);
        if let Some(s) = client_state {
            pairs.append_pair("state", s);
        }
    }
    Redirect::to(url.as_str()).into_response()
}

fn consent_page(client_name: &str, redirect_uri: &str, continue_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Authorize access</title>
  <style>
    body {{ font-family: system-ui, sans-serif; max-width: 32rem; margin: 4rem auto; padding: 0 1rem; color: #1a1a1a; }}
    .card {{ border: 1px solid #d0d0d0; border-radius: 8px; padding: 2rem; }}
    .continue {{ display: inline-block; margin-top: 1.5rem; padding: 0.6rem 1.4rem; border-radius: 6px;
                 background: #1a6dd4; color: #fff; text-decoration: none; }}
    .target {{ color: #555; word-break: break-all; }}
  </style>
</head>
<body>
  <div class="card">
    <h1>Authorize access</h1>
    <p><strong>{client_name}</strong> is requesting access to this MCP server.</p>
    <p class="target">After signing in you will be returned to: {redirect_uri}</p>
    <a class="continue" href="{continue_url}">Continue to sign in</a>
  </div>
</body>
</html>
"#,
        client_name = html_escape(client_name),
        redirect_uri = html_escape(redirect_uri),
        continue_url = html_escape(continue_url),
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Deserialize)]
pub struct MockIdpAuthorizeQuery {
    pub state: String,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// `GET /mock-upstream-idp/authorize`: the simulated identity provider.
/// Every sign-in attempt succeeds instantly; the caller may pin the user
/// with `userId`, otherwise a throwaway guest identity is minted.
pub async fn mock_idp_authorize(
    State(state): State<AppState>,
    Query(query): Query<MockIdpAuthorizeQuery>,
) -> Result<Redirect, GatewayError> {
    let user_id = query
        .user_id
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("user-{}", &generate_token()[..12]));

    let mut url = Url::parse(&format!(
        "{}/mock-upstream-idp/callback",
        state.base_uri.trim_end_matches('/')
    ))
    .map_err(|e| GatewayError::BadRequest(format!("BASE_URI is not a valid URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("state", &query.state)
        .append_pair("userId", &user_id);

    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct MockIdpCallbackQuery {
    pub state: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// `GET /mock-upstream-idp/callback`: the upstream has vouched for a user.
/// Mint the MCP tokens, bind them to the authorization code, and send the
/// user agent back where the client asked.
pub async fn mock_idp_callback(
    State(state): State<AppState>,
    Query(query): Query<MockIdpCallbackQuery>,
) -> Result<Redirect, GatewayError> {
    let upstream_installation = json!({
        "userId": query.user_id,
        "grantedAt": Utc::now().timestamp(),
    });

    let completed = state
        .auth
        .complete_upstream_authorization(&query.state, &query.user_id, upstream_installation)
        .await?;

    let mut url = Url::parse(&completed.redirect_uri)
        .map_err(|e| GatewayError::BadRequest(format!("stored redirect_uri is not a valid URL: {e}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("code", &query.state);
        if let Some(client_state) = &completed.client_state {
            pairs.append_pair("state", client_state);
        }
    }

    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// `POST /token`: the `authorization_code` and `refresh_token` grants.
pub async fn token(
    State(state): State<AppState>,
    axum::Form(req): axum::Form<TokenRequest>,
) -> Result<Json<Value>, GatewayError> {
    let tokens = match req.grant_type.as_str() {
        "authorization_code" => {
            let code = require_param(req.code, "code")?;
            let code_verifier = require_param(req.code_verifier, "code_verifier")?;
            let client_id = require_param(req.client_id, "client_id")?;
            state
                .auth
                .exchange_authorization_code(ExchangeCodeRequest {
                    code,
                    code_verifier,
                    client_id,
                    resource: req.resource,
                })
                .await?
        }
        "refresh_token" => {
            let refresh_token = require_param(req.refresh_token, "refresh_token")?;
            state
                .auth
                .exchange_refresh_token(&refresh_token, req.client_id.as_deref())
                .await?
        }
        other => {
            return Err(GatewayError::BadRequest(format!(
                "unsupported grant_type: {other}"
            )));
        }
    };

    Ok(Json(json!({
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
        "token_type": "Bearer",
        "expires_in": tokens.expires_in,
    })))
}

fn require_param(value: Option<String>, name: &str) -> Result<String, GatewayError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::BadRequest(format!("{name} parameter is required")))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /revoke` (RFC 7009). Hint-agnostic; always returns 200 for known
/// and unknown tokens alike, per the RFC's guidance against leaking token
/// validity.
pub async fn revoke(
    State(state): State<AppState>,
    axum::Form(req): axum::Form<RevokeRequest>,
) -> Result<StatusCode, GatewayError> {
    let token = req
        .token
        .ok_or_else(|| GatewayError::BadRequest("token parameter is required".into()))?;

    if let Err(err) = state.auth.revoke(&token).await {
        tracing::info!(%err, "revoke of an already-absent token");
    }
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /introspect` (RFC 7662). On any verification failure the response
/// is a bare `{"active": false}` — the reason never leaks.
pub async fn introspect(
    State(state): State<AppState>,
    axum::Form(req): axum::Form<IntrospectRequest>,
) -> Result<Json<Value>, GatewayError> {
    let token = req
        .token
        .ok_or_else(|| GatewayError::BadRequest("token parameter is required".into()))?;

    match state.auth.verify_access_token(&token).await {
        Ok(installation) => {
            let expires_at = installation.expires_at();
            let aud = installation
                .resource
                .clone()
                .unwrap_or_else(|| state.canonical_resource.clone());
            Ok(Json(json!({
                "active": true,
                "client_id": installation.client_id,
                "scope": "mcp",
                "exp": expires_at,
                "iat": installation.issued_at,
                "sub": &installation.user_id,
                "aud": aud,
                "iss": state.base_uri.trim_end_matches('/'),
                "token_type": "Bearer",
                "username": installation.user_id,
            })))
        }
        Err(_) => Ok(Json(json!({ "active": false }))),
    }
}
