use std::future::Future;

use gateway_auth::VerifiedToken;
use serde_json::Value;

tokio::task_local! {
    static AUTH_CONTEXT: AuthContext;
}

/// Request-scoped auth context established by the bearer gate. Carried on a
/// cooperative task-local, so it propagates across every await point within
/// a single request's handler task and can never leak into another
/// request's.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The raw bearer token. Downstream code relays it, never logs it.
    pub access_token: String,
    pub verified: VerifiedToken,
    /// Embedded mode only: the upstream IdP state bound to this token's
    /// installation.
    pub upstream_installation: Option<Value>,
}

/// Run `fut` with `ctx` as the ambient auth context.
pub async fn with_auth_context<F: Future>(ctx: AuthContext, fut: F) -> F::Output {
    AUTH_CONTEXT.scope(ctx, fut).await
}

/// The ambient auth context, when running inside the bearer gate's scope.
pub fn current_auth_context() -> Option<AuthContext> {
    AUTH_CONTEXT.try_with(Clone::clone).ok()
}

/// The slice of [`AuthContext`] handlers usually need, attached to the
/// request's extensions for extractor ergonomics. Carries the token's
/// fingerprint rather than the token, so it is safe to log wholesale.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub access_token_fingerprint: String,
    pub verified: VerifiedToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(token: &str) -> AuthContext {
        AuthContext {
            access_token: token.to_string(),
            verified: VerifiedToken {
                client_id: "client-1".into(),
                user_id: "user-1".into(),
                scopes: vec!["mcp".into()],
                expires_at: 0,
            },
            upstream_installation: None,
        }
    }

    #[tokio::test]
    async fn context_is_visible_across_await_points_inside_the_scope() {
        with_auth_context(context("token-a"), async {
            tokio::task::yield_now().await;
            let ctx = current_auth_context().expect("context must survive suspension");
            assert_eq!(ctx.access_token, "token-a");
        })
        .await;
    }

    #[tokio::test]
    async fn context_does_not_leak_outside_the_scope() {
        with_auth_context(context("token-a"), async {}).await;
        assert!(current_auth_context().is_none());
    }

    #[tokio::test]
    async fn concurrent_scopes_stay_isolated() {
        let a = with_auth_context(context("token-a"), async {
            tokio::task::yield_now().await;
            current_auth_context().unwrap().access_token
        });
        let b = with_auth_context(context("token-b"), async {
            tokio::task::yield_now().await;
            current_auth_context().unwrap().access_token
        });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a, "token-a");
        assert_eq!(b, "token-b");
    }
}
