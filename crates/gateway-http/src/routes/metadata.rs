use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// `GET /.well-known/oauth-authorization-server` (RFC 8414).
pub async fn authorization_server_metadata(State(state): State<AppState>) -> Json<Value> {
    let base = state.base_uri.trim_end_matches('/');
    Json(json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "registration_endpoint": format!("{base}/register"),
        "revocation_endpoint": format!("{base}/revoke"),
        "introspection_endpoint": format!("{base}/introspect"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["none"],
        "code_challenge_methods_supported": ["S256"],
        "scopes_supported": ["mcp"],
    }))
}

/// `GET /.well-known/oauth-protected-resource` (RFC 9728). In split mode
/// this resource server advertises the external issuer, not itself.
pub async fn protected_resource_metadata(State(state): State<AppState>) -> Json<Value> {
    let base = state.base_uri.trim_end_matches('/');
    let authorization_server = state
        .auth_server_url
        .as_deref()
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|| base.to_string());

    Json(json!({
        "resource": state.canonical_resource,
        "authorization_servers": [authorization_server],
        "scopes_supported": ["mcp"],
        "bearer_methods_supported": ["header"],
    }))
}
