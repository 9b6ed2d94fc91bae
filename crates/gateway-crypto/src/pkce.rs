use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Verify a PKCE (RFC 7636) S256 `code_verifier` against a stored
/// `code_challenge`.
///
/// Computes `base64url(sha256(verifier))` without padding and compares it to
/// `challenge` in constant time. `plain` challenge method is not supported —
/// this gateway requires S256 for every authorization request.
pub fn verify_pkce(verifier: &str, challenge: &str) -> bool {
    let digest = Sha256::digest(verifier.as_bytes());
    let computed = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_verifier() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(verify_pkce(verifier, challenge));
    }

    #[test]
    fn rejects_wrong_verifier() {
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(!verify_pkce("wrong-verifier", challenge));
    }

    #[test]
    fn rejects_empty_verifier() {
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(!verify_pkce("", challenge));
    }
}
