mod mcp;
mod metadata;
mod oauth;

pub use mcp::{delete_mcp, get_mcp, get_sse, post_mcp, post_message};
pub use metadata::{authorization_server_metadata, protected_resource_metadata};
pub use oauth::{
    authorize, introspect, mock_idp_authorize, mock_idp_callback, register, revoke, token,
};
