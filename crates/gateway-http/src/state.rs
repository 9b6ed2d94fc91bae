use std::sync::Arc;
use std::time::Duration;

use gateway_auth::{
    canonicalize_resource, AuthMode, AuthStateMachine, CachingVerifier, EmbeddedVerifier,
    ExternalVerifier, TokenVerifier,
};
use gateway_kv::EncryptedKv;
use gateway_relay::{McpSessionFactory, SessionHost, SessionRelay};

/// Shared state reachable from every route handler.
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<EncryptedKv>,
    pub auth: AuthStateMachine,
    pub verifier: Arc<dyn TokenVerifier>,
    pub relay: SessionRelay,
    pub sessions: SessionHost,
    pub base_uri: String,
    /// `base_uri` canonicalized once, for audience comparisons and the `aud`
    /// claim on introspection responses.
    pub canonical_resource: String,
    pub auth_mode: AuthMode,
    /// Split mode only: the external authorization server this resource
    /// server defers to.
    pub auth_server_url: Option<String>,
}

impl AppState {
    pub fn new(
        kv: Arc<EncryptedKv>,
        relay_client: redis::Client,
        base_uri: String,
        auth_mode: AuthMode,
        auth_server_url: Option<String>,
        session_factory: Arc<dyn McpSessionFactory>,
        session_inactivity_timeout: Duration,
    ) -> Self {
        let auth = AuthStateMachine::new(kv.clone());
        let relay = SessionRelay::new(relay_client.clone());
        let sessions = SessionHost::new(
            relay_client,
            kv.clone(),
            session_factory,
            session_inactivity_timeout,
        );

        let verifier: Arc<dyn TokenVerifier> = match (auth_mode, &auth_server_url) {
            (AuthMode::External, Some(url)) => Arc::new(CachingVerifier::new(
                ExternalVerifier::new(format!("{}/introspect", url.trim_end_matches('/'))),
            )),
            _ => Arc::new(CachingVerifier::new(EmbeddedVerifier::new(auth.clone()))),
        };

        let canonical_resource = canonicalize_resource(&base_uri)
            .unwrap_or_else(|_| base_uri.trim_end_matches('/').to_string());

        Self {
            kv,
            auth,
            verifier,
            relay,
            sessions,
            base_uri,
            canonical_resource,
            auth_mode,
            auth_server_url,
        }
    }
}
