//! Pub/sub session relay: the bridge that lets the HTTP edge hand MCP
//! JSON-RPC traffic to a separate pool of MCP server processes over Redis.
//!
//! This crate never interprets JSON-RPC method names; it only routes opaque
//! envelopes by session and request id and enforces session ownership.

mod channels;
mod envelope;
mod error;
mod owner;
mod server_session;
mod transport;

pub use channels::{
    control_channel, to_client_channel, to_client_stream_channel, to_server_channel,
};
pub use envelope::{
    request_id_segment, ControlAction, MessageExtra, RelayMessage, SendOptions,
};
pub use error::RelayError;
pub use owner::{delete_session_owner, get_session_owner, set_session_owner};
pub use server_session::{McpServerHandle, McpSessionFactory, ServerSessionTransport, SessionHost};
pub use transport::SessionRelay;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RelayError>;
