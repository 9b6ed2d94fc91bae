//! Integration tests for the session relay against a real Redis container:
//! the full edge → bus → server-session → bus → edge round trip, liveness,
//! explicit shutdown, and the inactivity reaper built into the session
//! transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gateway_kv::EncryptedKv;
use gateway_relay::{
    get_session_owner, set_session_owner, McpServerHandle, RelayMessage, ServerSessionTransport,
    SessionRelay,
};
use serde_json::{json, Value};
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};

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

/// Echoes every request's method back in its result; drops notifications.
struct EchoServer;

#[async_trait]
impl McpServerHandle for EchoServer {
    async fn handle(&self, message: Value, auth_info: Option<Value>) -> Option<Value> {
        let id = message.get("id")?.clone();
        Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "echo": message.get("method").cloned().unwrap_or(Value::Null),
                "sawAuthInfo": auth_info.is_some(),
            },
        }))
    }
}

struct Harness {
    _container: ContainerAsync<GenericImage>,
    client: redis::Client,
    kv: Arc<EncryptedKv>,
    relay: SessionRelay,
}

async fn harness() -> Harness {
    let (container, redis_url) = spawn_redis().await;
    let client = redis::Client::open(redis_url.as_str()).unwrap();
    let kv = Arc::new(EncryptedKv::connect(&redis_url).await.unwrap());
    let relay = SessionRelay::new(client.clone());
    Harness {
        _container: container,
        client,
        kv,
        relay,
    }
}

impl Harness {
    async fn start_session(&self, session_id: &str, inactivity_timeout: Duration) {
        ServerSessionTransport::start(
            self.client.clone(),
            self.kv.clone(),
            session_id.to_string(),
            Arc::new(EchoServer),
            inactivity_timeout,
        )
        .await
        .unwrap();
    }

    /// Poll until the session's liveness predicate settles at `expected`.
    async fn await_liveness(&self, session_id: &str, expected: bool) {
        for _ in 0..40 {
            if self.relay.is_live(session_id).await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("session {session_id} never became is_live={expected}");
    }
}

#[tokio::test]
async fn request_response_round_trips_through_the_bus() {
    let h = harness().await;
    h.start_session("s1", Duration::from_secs(60)).await;

    let envelope = RelayMessage::mcp_with_auth(
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        Some(json!({"userId": "u42"})),
    );
    let response = h
        .relay
        .request_response("s1", &envelope, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["echo"], "tools/list");
    assert_eq!(response["result"]["sawAuthInfo"], true);
}

#[tokio::test]
async fn notifications_are_relayed_without_a_response() {
    let h = harness().await;
    h.start_session("s2", Duration::from_secs(60)).await;

    let envelope = RelayMessage::mcp(json!({"jsonrpc": "2.0", "method": "notifications/progress"}));
    h.relay.publish_to_server("s2", &envelope).await.unwrap();

    // The session keeps serving requests afterwards.
    let envelope = RelayMessage::mcp(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}));
    let response = h
        .relay
        .request_response("s2", &envelope, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response["result"]["echo"], "ping");
}

#[tokio::test]
async fn liveness_tracks_the_server_side_subscription() {
    let h = harness().await;

    assert!(!h.relay.is_live("s3").await.unwrap());
    h.start_session("s3", Duration::from_secs(60)).await;
    h.await_liveness("s3", true).await;
}

#[tokio::test]
async fn shutdown_control_message_ends_the_session_and_unbinds_its_owner() {
    let h = harness().await;
    set_session_owner(&h.kv, "s4", "u42").await.unwrap();
    h.start_session("s4", Duration::from_secs(60)).await;
    h.await_liveness("s4", true).await;

    h.relay.shutdown("s4").await.unwrap();
    h.await_liveness("s4", false).await;

    assert_eq!(get_session_owner(&h.kv, "s4").await.unwrap(), None);
}

#[tokio::test]
async fn an_idle_session_reaps_itself_after_the_inactivity_timeout() {
    let h = harness().await;
    set_session_owner(&h.kv, "s5", "u42").await.unwrap();
    h.start_session("s5", Duration::from_millis(300)).await;
    h.await_liveness("s5", true).await;

    // No traffic at all: the transport's own timer must fire, publish
    // SHUTDOWN, and tear the session down.
    tokio::time::sleep(Duration::from_millis(600)).await;
    h.await_liveness("s5", false).await;
    assert_eq!(get_session_owner(&h.kv, "s5").await.unwrap(), None);
}

#[tokio::test]
async fn traffic_resets_the_inactivity_timer() {
    let h = harness().await;
    h.start_session("s6", Duration::from_millis(500)).await;
    h.await_liveness("s6", true).await;

    // Keep poking the session at intervals shorter than the timeout; it must
    // stay alive well past several timeout windows.
    for i in 0..5 {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let envelope = RelayMessage::mcp(json!({"jsonrpc": "2.0", "id": i, "method": "ping"}));
        h.relay
            .request_response("s6", &envelope, Duration::from_secs(5))
            .await
            .unwrap();
    }
    assert!(h.relay.is_live("s6").await.unwrap());
}
