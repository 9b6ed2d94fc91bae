//! OAuth 2.1 client registry, authorization state machine, and the
//! embedded/external token verifier seam, for the MCP session relay gateway.

mod client_registry;
mod error;
mod redirect;
mod resource;
mod state_machine;
mod verifier;

pub use client_registry::{get_client, register_client, RegisterClientRequest};
pub use error::AuthError;
pub use redirect::validate_redirect_uri;
pub use resource::canonicalize_resource;
pub use state_machine::{
    AuthStateMachine, CompletedAuthorization, ExchangeCodeRequest, StartAuthorizationRequest,
    ACCESS_TOKEN_EXPIRES_IN,
};
pub use verifier::{
    AuthMode, CachingVerifier, EmbeddedVerifier, ExternalVerifier, TokenVerifier, VerifiedToken,
};

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;
