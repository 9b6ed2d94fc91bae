use axum::extract::Request;
use axum::http::header::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

static X_CONTENT_TYPE_OPTIONS: HeaderName = HeaderName::from_static("x-content-type-options");
static X_FRAME_OPTIONS: HeaderName = HeaderName::from_static("x-frame-options");
static STRICT_TRANSPORT_SECURITY: HeaderName = HeaderName::from_static("strict-transport-security");
static CONTENT_SECURITY_POLICY: HeaderName = HeaderName::from_static("content-security-policy");
static CACHE_CONTROL: HeaderName = axum::http::header::CACHE_CONTROL;

/// Applied to every response: the baseline hardening headers this gateway
/// never serves without.
pub async fn apply_security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_CONTENT_TYPE_OPTIONS.clone(), HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS.clone(), HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(
        STRICT_TRANSPORT_SECURITY.clone(),
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    // The consent page sets its own, more permissive policy; every other
    // response gets the lockdown default.
    if !headers.contains_key(&CONTENT_SECURITY_POLICY) {
        headers.insert(
            CONTENT_SECURITY_POLICY.clone(),
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        );
    }

    response
}

/// Applied only to the OAuth/auth-surface routes: tokens and codes must
/// never be cached.
pub async fn no_store(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL.clone(), HeaderValue::from_static("no-store"));
    response
}
