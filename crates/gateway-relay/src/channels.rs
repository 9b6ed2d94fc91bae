/// Edge publishes inbound JSON-RPC envelopes here; the MCP server process
/// handling the session consumes them. `NUMSUB` on this channel is the
/// session's liveness predicate.
pub fn to_server_channel(session_id: &str) -> String {
    format!("mcp:shttp:toserver:{session_id}")
}

/// MCP server publishes the response to a specific in-flight request here.
pub fn to_client_channel(session_id: &str, request_id: &str) -> String {
    format!("mcp:shttp:toclient:{session_id}:{request_id}")
}

/// MCP server publishes server-initiated (unsolicited) messages here, for
/// forwarding onto the session's SSE stream.
pub fn to_client_stream_channel(session_id: &str) -> String {
    format!("mcp:shttp:toclient:{session_id}:__GET_stream")
}

/// SHUTDOWN control messages (inactivity timeout, explicit deletion).
pub fn control_channel(session_id: &str) -> String {
    format!("mcp:control:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_match_the_documented_topology() {
        assert_eq!(to_server_channel("s1"), "mcp:shttp:toserver:s1");
        assert_eq!(to_client_channel("s1", "r1"), "mcp:shttp:toclient:s1:r1");
        assert_eq!(
            to_client_stream_channel("s1"),
            "mcp:shttp:toclient:s1:__GET_stream"
        );
        assert_eq!(control_channel("s1"), "mcp:control:s1");
    }
}
