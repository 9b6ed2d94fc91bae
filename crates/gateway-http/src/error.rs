use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_auth::AuthError;
use gateway_relay::RelayError;
use serde_json::json;

/// Errors surfaced by the HTTP edge. Wraps the auth and relay crates' own
/// error types and maps them to RFC 6749 §5.2-shaped JSON bodies.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("missing or malformed bearer token")]
    Unauthorized,

    #[error("malformed request: {0}")]
    BadRequest(String),
}

impl GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Auth(err) => err.error_code(),
            GatewayError::Relay(RelayError::SessionNotOwned) => "invalid_session",
            GatewayError::Relay(RelayError::SessionGone) => "session_gone",
            GatewayError::Relay(RelayError::MissingRequestId) => "invalid_request",
            GatewayError::Relay(_) => "internal",
            GatewayError::Unauthorized => "invalid_token",
            GatewayError::BadRequest(_) => "invalid_request",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(err) => StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            GatewayError::Relay(RelayError::SessionNotOwned) => StatusCode::BAD_REQUEST,
            GatewayError::Relay(RelayError::SessionGone) => StatusCode::NOT_FOUND,
            GatewayError::Relay(RelayError::MissingRequestId) => StatusCode::BAD_REQUEST,
            GatewayError::Relay(RelayError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// The client-facing description. `Internal`/`UpstreamUnavailable`
    /// variants and every relay-internal error never put their detail here —
    /// only the log line gets the full message.
    fn client_description(&self) -> String {
        match self {
            GatewayError::Auth(AuthError::Internal(_)) => "an internal error occurred".into(),
            GatewayError::Auth(AuthError::UpstreamUnavailable { .. }) => {
                "token verification is currently unavailable".into()
            }
            GatewayError::Relay(RelayError::Redis(_))
            | GatewayError::Relay(RelayError::Serialization(_))
            | GatewayError::Relay(RelayError::Kv(_)) => "an internal error occurred".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.error_code();
        let description = self.client_description();

        tracing::info!(error, status = status.as_u16(), detail = %self, "request rejected");

        let body = Json(json!({
            "error": error,
            "error_description": description,
        }));

        (status, body).into_response()
    }
}
