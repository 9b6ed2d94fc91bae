/// The error kinds the OAuth surface can produce. Each maps onto an HTTP
/// status and an `error`/`error_description` body for client-facing
/// responses; `Internal` and `UpstreamUnavailable` never put their detail
/// message in that body, only in the log.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("invalid client: {reason}")]
    InvalidClient { reason: String },

    /// Registration-time rejection (RFC 7591's `invalid_client_metadata`).
    #[error("invalid client metadata: {reason}")]
    InvalidClientMetadata { reason: String },

    #[error("invalid grant: {reason}")]
    InvalidGrant { reason: String },

    /// The upstream IdP callback carried a `state` that matches no pending
    /// authorization.
    #[error("unknown or expired authorization state")]
    InvalidState,

    #[error("invalid token")]
    InvalidToken,

    /// An authorization code was exchanged more than once. Reported to the
    /// client as a plain `invalid_grant` — the replay itself is only logged.
    #[error("replay detected")]
    ReplayDetected,

    /// The external introspection endpoint could not be reached or answered
    /// garbage. Fails closed: to a caller this is indistinguishable from an
    /// invalid token.
    #[error("upstream authorization server unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<gateway_kv::KvError> for AuthError {
    fn from(e: gateway_kv::KvError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl AuthError {
    /// The RFC 6749 §5.2 `error` code this kind maps to.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidClient { .. } => "invalid_client",
            AuthError::InvalidClientMetadata { .. } => "invalid_client_metadata",
            AuthError::InvalidGrant { .. } | AuthError::ReplayDetected => "invalid_grant",
            AuthError::InvalidState => "invalid_state",
            AuthError::InvalidToken | AuthError::UpstreamUnavailable { .. } => "invalid_token",
            AuthError::Internal(_) => "server_error",
        }
    }

    /// The HTTP status this kind maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidClient { .. }
            | AuthError::InvalidClientMetadata { .. }
            | AuthError::InvalidGrant { .. }
            | AuthError::InvalidState
            | AuthError::ReplayDetected => 400,
            AuthError::InvalidToken | AuthError::UpstreamUnavailable { .. } => 401,
            AuthError::Internal(_) => 500,
        }
    }
}
