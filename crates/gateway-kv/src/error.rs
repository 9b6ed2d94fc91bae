/// Errors produced by the encrypted KV store.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The underlying Redis operation failed after exhausting retries.
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored value could not be (de)serialized as the record type.
    #[error("record serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    /// The lookup key is not a 64-hex-char token and therefore cannot key an
    /// encrypted record.
    #[error("lookup key is not a valid token")]
    InvalidLookupToken,

    /// Decrypting a stored value failed.
    #[error("decryption failed: {0}")]
    Decrypt(#[from] gateway_crypto::CryptoError),
}
