/// Errors produced by the crypto primitives in this crate.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The ciphertext wire format (`hex(iv)+":"+hex(ciphertext)`) was malformed.
    #[error("malformed ciphertext envelope")]
    MalformedEnvelope,

    /// Hex decoding of the IV or ciphertext failed.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] std::num::ParseIntError),

    /// Decryption failed — wrong key, corrupted ciphertext, or bad padding.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The IV was not exactly 16 bytes.
    #[error("invalid IV length: expected 16 bytes, got {0}")]
    InvalidIvLength(usize),
}
