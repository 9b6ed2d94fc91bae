//! Cryptographic primitives for the MCP OAuth2.1 gateway.
//!
//! Everything here is stateless and pure: token generation, SHA-256
//! fingerprinting of lookup keys, AES-256-CBC encryption for data stored at
//! rest, and PKCE (RFC 7636) S256 verification. None of these functions talk
//! to storage or the network; callers own persistence.

mod aes_cbc;
mod error;
mod fingerprint;
mod pkce;
mod token;

pub use aes_cbc::{decrypt, encrypt};
pub use error::CryptoError;
pub use fingerprint::fingerprint;
pub use pkce::verify_pkce;
pub use token::{cipher_key, generate_token, TOKEN_BYTES};
