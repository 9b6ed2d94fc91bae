//! Encrypted, TTL'd Redis-backed KV store for the MCP auth gateway.
//!
//! Secret-keyed records (pending authorizations, token exchanges,
//! installations, refresh indexes) are stored at `{prefix}:{sha256(token)}`
//! and encrypted at rest under the lookup token itself, so the KV contents
//! alone never yield a live credential. Plaintext records (client
//! registrations, session owners) are keyed by public identifiers.

mod error;
mod records;
mod store;

pub use error::KvError;
pub use records::{
    client_key, session_owner_key, ClientRegistration, Installation, McpTokens,
    PendingAuthorization, SecretRecord, TokenExchange, CLIENT_TTL, EXCHANGE_TTL, INSTALLATIONS,
    INSTALLATION_TTL, PENDING_AUTHORIZATIONS, PENDING_TTL, REFRESH_INDEX, REFRESH_TTL,
    TOKEN_EXCHANGES,
};
pub use store::EncryptedKv;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, KvError>;
