use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::CryptoError;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;

/// Encrypt `plaintext` under `key` (32 bytes, AES-256) with a fresh random IV.
///
/// Returns the wire format `hex(iv) + ":" + hex(ciphertext)`.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> String {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let ciphertext = Encryptor::new(key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    format!("{}:{}", hex_lower(&iv), hex_lower(&ciphertext))
}

/// Decrypt an envelope produced by [`encrypt`] under `key`.
///
/// Fails closed: malformed envelopes, wrong keys, and corrupted ciphertext
/// all surface as [`CryptoError::DecryptionFailed`] (or a more specific
/// parsing error), never a silent garbage plaintext.
pub fn decrypt(key: &[u8; 32], envelope: &str) -> Result<Vec<u8>, CryptoError> {
    let (iv_hex, ciphertext_hex) = envelope
        .split_once(':')
        .ok_or(CryptoError::MalformedEnvelope)?;

    let iv = hex_decode(iv_hex)?;
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidIvLength(iv.len()));
    }
    let mut iv_arr = [0u8; IV_LEN];
    iv_arr.copy_from_slice(&iv);

    let mut ciphertext = hex_decode(ciphertext_hex)?;

    Decryptor::new(key.into(), &iv_arr.into())
        .decrypt_padded_mut::<Pkcs7>(&mut ciphertext)
        .map(<[u8]>::to_vec)
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn hex_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    if s.len() % 2 != 0 {
        return Err(CryptoError::MalformedEnvelope);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(CryptoError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        *b"01234567890123456789012345678901"
    }

    #[test]
    fn round_trips() {
        let key = key();
        let plaintext = b"{\"userId\":\"u-1\"}";
        let envelope = encrypt(&key, plaintext);
        let decrypted = decrypt(&key, &envelope).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn envelope_has_expected_shape() {
        let envelope = encrypt(&key(), b"hello");
        let parts: Vec<&str> = envelope.split(':').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), IV_LEN * 2);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let envelope = encrypt(&key(), b"secret payload");
        let wrong_key = *b"98765432109876543210987654321098";
        assert!(decrypt(&wrong_key, &envelope).is_err());
    }

    #[test]
    fn malformed_envelope_rejected() {
        assert!(decrypt(&key(), "not-a-valid-envelope").is_err());
    }

    #[test]
    fn distinct_ivs_for_same_plaintext() {
        let key = key();
        let a = encrypt(&key, b"same");
        let b = encrypt(&key, b"same");
        assert_ne!(a, b);
    }
}
