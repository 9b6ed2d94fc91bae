use sha2::{Digest, Sha256};

/// SHA-256 fingerprint of a secret, lower-hex encoded.
///
/// Used to derive KV lookup keys (`auth:pending:{fingerprint}`, etc.) from
/// authorization codes, access tokens, and refresh tokens, so that the raw
/// secret is never itself a storage key and a KV dump never reveals live
/// credentials.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}
