use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The envelope relayed between the HTTP edge and the MCP server process.
/// `message` is an opaque JSON-RPC payload; this crate reads nothing from it
/// beyond `id`, which routes responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayMessage {
    Mcp {
        message: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<SendOptions>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<MessageExtra>,
    },
    Control {
        action: ControlAction,
        /// Unix milliseconds at publication, for log correlation.
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    /// JSON-RPC id (string or number) of the request this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_request_id: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageExtra {
    /// Verified-token context attached by the edge, opaque to the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControlAction {
    #[serde(rename = "SHUTDOWN")]
    Shutdown,
}

impl RelayMessage {
    pub fn mcp(message: Value) -> Self {
        RelayMessage::Mcp {
            message,
            options: None,
            extra: None,
        }
    }

    pub fn mcp_with_auth(message: Value, auth_info: Option<Value>) -> Self {
        RelayMessage::Mcp {
            message,
            options: None,
            extra: auth_info.map(|auth_info| MessageExtra {
                auth_info: Some(auth_info),
            }),
        }
    }

    pub fn response(message: Value, related_request_id: Value) -> Self {
        RelayMessage::Mcp {
            message,
            options: Some(SendOptions {
                related_request_id: Some(related_request_id),
            }),
            extra: None,
        }
    }

    pub fn shutdown() -> Self {
        RelayMessage::Control {
            action: ControlAction::Shutdown,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// The JSON-RPC `id` of the wrapped message, rendered as a pub/sub
    /// channel segment. `None` for notifications and control messages.
    pub fn request_id(&self) -> Option<String> {
        match self {
            RelayMessage::Mcp { message, .. } => request_id_segment(message),
            RelayMessage::Control { .. } => None,
        }
    }
}

/// A JSON-RPC id (string or number) as a channel-name segment.
pub fn request_id_segment(message: &Value) -> Option<String> {
    match message.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mcp_envelope_round_trips_through_json() {
        let envelope = RelayMessage::mcp_with_auth(
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}),
            Some(json!({"userId": "u42"})),
        );
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["type"], "mcp");
        assert_eq!(wire["extra"]["authInfo"]["userId"], "u42");

        let back: RelayMessage = serde_json::from_value(wire).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.request_id().as_deref(), Some("7"));
    }

    #[test]
    fn control_envelope_carries_the_shutdown_action() {
        let wire = serde_json::to_value(RelayMessage::shutdown()).unwrap();
        assert_eq!(wire["type"], "control");
        assert_eq!(wire["action"], "SHUTDOWN");
        assert!(wire["timestamp"].is_i64());
    }

    #[test]
    fn response_envelope_names_its_related_request() {
        let envelope = RelayMessage::response(json!({"jsonrpc": "2.0", "id": "r1", "result": {}}), json!("r1"));
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["options"]["relatedRequestId"], "r1");
    }

    #[test]
    fn notifications_have_no_request_id() {
        let envelope = RelayMessage::mcp(json!({"jsonrpc": "2.0", "method": "notifications/progress"}));
        assert_eq!(envelope.request_id(), None);
    }
}
