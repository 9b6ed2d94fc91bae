use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use gateway_auth::AuthMode;

use crate::middleware::{apply_security_headers, layer_for, no_store, require_bearer, RateLimitConfig};
use crate::routes;
use crate::state::AppState;

/// Maximum JSON-RPC request body size.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Build the full router: MCP transport (bearer-gated, omitted entirely in
/// `AuthOnly` mode), OAuth surface (public, rate-limited per endpoint), and
/// metadata discovery (public).
pub fn build_router(state: AppState) -> Router {
    // Mirrored rather than wildcarded: wildcards cannot be combined with
    // credentialed requests.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .expose_headers([
            axum::http::HeaderName::from_static("mcp-session-id"),
            axum::http::HeaderName::from_static("mcp-protocol-version"),
        ]);

    let mcp_routes = if state.auth_mode == AuthMode::AuthOnly {
        Router::new()
    } else {
        Router::new()
            .route("/mcp", post(routes::post_mcp).get(routes::get_mcp).delete(routes::delete_mcp))
            .route("/sse", get(routes::get_sse))
            .route("/message", post(routes::post_message))
            .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_bearer))
    };

    let oauth_routes = Router::new()
        .route("/register", post(routes::register).route_layer(layer_for(RateLimitConfig::register())))
        .route("/authorize", get(routes::authorize))
        .route(
            "/mock-upstream-idp/authorize",
            get(routes::mock_idp_authorize).route_layer(layer_for(RateLimitConfig::mock_upstream_idp())),
        )
        .route(
            "/mock-upstream-idp/callback",
            get(routes::mock_idp_callback).route_layer(layer_for(RateLimitConfig::mock_upstream_idp())),
        )
        .route("/token", post(routes::token).route_layer(layer_for(RateLimitConfig::token())))
        .route("/revoke", post(routes::revoke))
        .route("/introspect", post(routes::introspect))
        .route_layer(axum_middleware::from_fn(no_store));

    let metadata_routes = Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(routes::authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(routes::protected_resource_metadata),
        );

    Router::new()
        .merge(mcp_routes)
        .merge(oauth_routes)
        .merge(metadata_routes)
        .layer(axum_middleware::from_fn(apply_security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}
