use std::sync::Arc;

use async_trait::async_trait;
use gateway_relay::{McpServerHandle, McpSessionFactory};
use serde_json::{json, Value};
use tracing::debug;

/// The MCP protocol revision this reference server offers when the client
/// doesn't name one.
const PROTOCOL_VERSION: &str = "2025-03-26";

/// A deliberately minimal MCP server instance: answers `initialize` and
/// `ping`, rejects every other request with a JSON-RPC method-not-found
/// error, and swallows notifications. A real deployment swaps this out by
/// providing its own [`McpSessionFactory`] — the relay neither knows nor
/// cares what sits behind the trait.
pub struct ReferenceMcpServer {
    session_id: String,
}

#[async_trait]
impl McpServerHandle for ReferenceMcpServer {
    async fn handle(&self, message: Value, _auth_info: Option<Value>) -> Option<Value> {
        // Notifications carry no id and get no response.
        let id = message.get("id")?.clone();
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();

        let response = match method {
            "initialize" => {
                let protocol_version = message
                    .pointer("/params/protocolVersion")
                    .and_then(Value::as_str)
                    .unwrap_or(PROTOCOL_VERSION);
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": protocol_version,
                        "capabilities": {},
                        "serverInfo": {
                            "name": "mcp-gateway",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    },
                })
            }
            "ping" => json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
            other => {
                debug!(session_id = %self.session_id, method = %other, "unhandled method");
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("Method not found: {other}") },
                })
            }
        };
        Some(response)
    }
}

pub struct ReferenceMcpFactory;

impl McpSessionFactory for ReferenceMcpFactory {
    fn create(&self, session_id: &str) -> Arc<dyn McpServerHandle> {
        Arc::new(ReferenceMcpServer {
            session_id: session_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ReferenceMcpServer {
        ReferenceMcpServer {
            session_id: "s1".into(),
        }
    }

    #[tokio::test]
    async fn initialize_echoes_the_requested_protocol_version() {
        let response = server()
            .handle(
                json!({
                    "jsonrpc": "2.0", "id": 1, "method": "initialize",
                    "params": { "protocolVersion": "2024-11-05" },
                }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn unknown_methods_get_a_method_not_found_error() {
        let response = server()
            .handle(json!({ "jsonrpc": "2.0", "id": "r9", "method": "tools/call" }), None)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let response = server()
            .handle(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }), None)
            .await;
        assert!(response.is_none());
    }
}
