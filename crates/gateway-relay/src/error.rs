/// Errors produced by the session relay transport.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("envelope serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("kv store error: {0}")]
    Kv(#[from] gateway_kv::KvError),

    #[error("session is gone")]
    SessionGone,

    #[error("session not owned by this caller")]
    SessionNotOwned,

    /// A request/response relay was attempted for a message with no JSON-RPC
    /// `id` — there is no channel to await the response on.
    #[error("message has no request id to await a response for")]
    MissingRequestId,

    #[error("timed out waiting for a response on this session")]
    Timeout,
}
