use rand::RngCore;

/// Length in bytes of a generated opaque token before hex encoding.
pub const TOKEN_BYTES: usize = 32;

/// Generate a 32-byte CSPRNG token, lower-hex encoded.
///
/// Used for access tokens, refresh tokens, authorization codes, and
/// `client_id`/`client_secret` values. Never a JWT — this gateway issues
/// opaque bearer tokens exclusively.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex_lower(&bytes)
}

/// Interpret a 64-char lower-hex token as the 32 raw bytes that key the
/// AES-256 encryption of the record it looks up.
///
/// Returns `None` for anything that is not exactly 64 hex characters — a
/// string that never came out of [`generate_token`] cannot key a record, so
/// no record can exist for it either.
pub fn cipher_key(token: &str) -> Option<[u8; TOKEN_BYTES]> {
    if token.len() != TOKEN_BYTES * 2 || !token.is_ascii() {
        return None;
    }
    let mut key = [0u8; TOKEN_BYTES];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&token[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(key)
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_64_char_lowercase_hex() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generates_distinct_tokens() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }

    #[test]
    fn cipher_key_round_trips_a_generated_token() {
        let token = generate_token();
        let key = cipher_key(&token).expect("generated tokens always decode");
        assert_eq!(hex_lower(&key), token);
    }

    #[test]
    fn cipher_key_rejects_non_token_strings() {
        assert!(cipher_key("").is_none());
        assert!(cipher_key("deadbeef").is_none());
        assert!(cipher_key(&"zz".repeat(32)).is_none());
        assert!(cipher_key(&"é".repeat(32)).is_none());
    }
}
