//! State-machine transition tests against a real Redis container, below the
//! HTTP layer: the full PENDING → EXCHANGEABLE → ACTIVE → ACTIVE' → REVOKED
//! walk, plus the failure edges the HTTP tests don't isolate.

use std::sync::Arc;

use gateway_auth::{
    register_client, AuthError, AuthStateMachine, ExchangeCodeRequest, RegisterClientRequest,
    StartAuthorizationRequest,
};
use gateway_kv::EncryptedKv;
use serde_json::json;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};

// RFC 7636 S256 test vector.
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
const REDIRECT_URI: &str = "https://client.example.com/callback";

async fn spawn_redis() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(ContainerPort::Tcp(6379))
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .expect("failed to start redis container");

    let port = container.get_host_port_ipv4(6379).await.unwrap();
    (container, format!("redis://127.0.0.1:{port}"))
}

struct Harness {
    _container: ContainerAsync<GenericImage>,
    kv: Arc<EncryptedKv>,
    auth: AuthStateMachine,
}

async fn harness() -> Harness {
    let (container, redis_url) = spawn_redis().await;
    let kv = Arc::new(EncryptedKv::connect(&redis_url).await.unwrap());
    let auth = AuthStateMachine::new(kv.clone());
    Harness {
        _container: container,
        kv,
        auth,
    }
}

impl Harness {
    async fn registered_client(&self) -> String {
        register_client(
            &self.kv,
            RegisterClientRequest {
                client_name: Some("integration test client".into()),
                redirect_uris: vec![REDIRECT_URI.into()],
                client_uri: None,
            },
        )
        .await
        .unwrap()
        .client_id
    }

    /// start → upstream completion, returning the authorization code.
    async fn authorized_code(&self, client_id: &str, user_id: &str) -> String {
        let code = self
            .auth
            .start_authorization(StartAuthorizationRequest {
                client_id: client_id.to_string(),
                redirect_uri: REDIRECT_URI.to_string(),
                code_challenge: CHALLENGE.to_string(),
                resource: None,
                state: Some("s1".into()),
            })
            .await
            .unwrap();

        let completed = self
            .auth
            .complete_upstream_authorization(&code, user_id, json!({"userId": user_id}))
            .await
            .unwrap();
        assert_eq!(completed.redirect_uri, REDIRECT_URI);
        assert_eq!(completed.client_state.as_deref(), Some("s1"));

        code
    }
}

#[tokio::test]
async fn the_full_lifecycle_mints_verifies_rotates_and_revokes() {
    let h = harness().await;
    let client_id = h.registered_client().await;
    let code = h.authorized_code(&client_id, "u42").await;

    let challenge = h
        .auth
        .challenge_for_authorization_code(&client_id, &code)
        .await
        .unwrap();
    assert_eq!(challenge, CHALLENGE);

    let tokens = h
        .auth
        .exchange_authorization_code(ExchangeCodeRequest {
            code,
            code_verifier: VERIFIER.to_string(),
            client_id: client_id.clone(),
            resource: None,
        })
        .await
        .unwrap();
    assert_eq!(tokens.expires_in, 3600);

    let installation = h.auth.verify_access_token(&tokens.access_token).await.unwrap();
    assert_eq!(installation.user_id, "u42");
    assert_eq!(installation.client_id, client_id);
    assert_eq!(installation.upstream_installation["userId"], "u42");

    let rotated = h
        .auth
        .exchange_refresh_token(&tokens.refresh_token, Some(&client_id))
        .await
        .unwrap();
    assert_ne!(rotated.access_token, tokens.access_token);
    assert_ne!(rotated.refresh_token, tokens.refresh_token);

    // The rotated-out access token was proactively retired.
    assert!(matches!(
        h.auth.verify_access_token(&tokens.access_token).await.unwrap_err(),
        AuthError::InvalidToken
    ));
    let rotated_installation = h.auth.verify_access_token(&rotated.access_token).await.unwrap();
    assert_eq!(rotated_installation.user_id, "u42");

    h.auth.revoke(&rotated.access_token).await.unwrap();
    assert!(h.auth.verify_access_token(&rotated.access_token).await.is_err());
    assert!(h
        .auth
        .exchange_refresh_token(&rotated.refresh_token, None)
        .await
        .is_err());
}

#[tokio::test]
async fn the_challenge_is_bound_to_the_issuing_client() {
    let h = harness().await;
    let client_id = h.registered_client().await;
    let other_client = h.registered_client().await;
    let code = h.authorized_code(&client_id, "u1").await;

    let err = h
        .auth
        .challenge_for_authorization_code(&other_client, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn an_unfinished_authorization_cannot_be_exchanged() {
    let h = harness().await;
    let client_id = h.registered_client().await;

    // Pending, but the upstream detour never completed.
    let code = h
        .auth
        .start_authorization(StartAuthorizationRequest {
            client_id: client_id.clone(),
            redirect_uri: REDIRECT_URI.to_string(),
            code_challenge: CHALLENGE.to_string(),
            resource: None,
            state: None,
        })
        .await
        .unwrap();

    let err = h
        .auth
        .exchange_authorization_code(ExchangeCodeRequest {
            code,
            code_verifier: VERIFIER.to_string(),
            client_id,
            resource: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}

#[tokio::test]
async fn a_replayed_code_fails_and_takes_the_installation_with_it() {
    let h = harness().await;
    let client_id = h.registered_client().await;
    let code = h.authorized_code(&client_id, "u1").await;

    let request = || ExchangeCodeRequest {
        code: code.clone(),
        code_verifier: VERIFIER.to_string(),
        client_id: client_id.clone(),
        resource: None,
    };

    let tokens = h.auth.exchange_authorization_code(request()).await.unwrap();
    assert!(h.auth.verify_access_token(&tokens.access_token).await.is_ok());

    let err = h.auth.exchange_authorization_code(request()).await.unwrap_err();
    assert!(matches!(err, AuthError::ReplayDetected));

    assert!(matches!(
        h.auth.verify_access_token(&tokens.access_token).await.unwrap_err(),
        AuthError::InvalidToken
    ));
    // The paired refresh token died with the installation.
    assert!(h
        .auth
        .exchange_refresh_token(&tokens.refresh_token, None)
        .await
        .is_err());
}

#[tokio::test]
async fn the_upstream_callback_rejects_an_unknown_state() {
    let h = harness().await;
    let err = h
        .auth
        .complete_upstream_authorization(&gateway_crypto::generate_token(), "u1", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));
}

#[tokio::test]
async fn a_refresh_token_is_single_use() {
    let h = harness().await;
    let client_id = h.registered_client().await;
    let code = h.authorized_code(&client_id, "u1").await;

    let tokens = h
        .auth
        .exchange_authorization_code(ExchangeCodeRequest {
            code,
            code_verifier: VERIFIER.to_string(),
            client_id,
            resource: None,
        })
        .await
        .unwrap();

    h.auth.exchange_refresh_token(&tokens.refresh_token, None).await.unwrap();
    let err = h
        .auth
        .exchange_refresh_token(&tokens.refresh_token, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidGrant { .. }));
}
