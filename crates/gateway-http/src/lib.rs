//! The HTTP edge: MCP Streamable HTTP + legacy SSE transport endpoints,
//! the OAuth 2.1 surface, and RFC 8414/9728 metadata discovery.

mod context;
mod error;
mod middleware;
mod router;
mod routes;
mod state;

pub use context::{current_auth_context, with_auth_context, AuthContext, RequestContext};
pub use error::GatewayError;
pub use gateway_auth::AuthMode;
pub use router::build_router;
pub use state::AppState;
