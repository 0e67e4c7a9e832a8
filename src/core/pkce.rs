//! # Proof Key for Code Exchange
//!
//! Verifier and `S256` challenge generation per [RFC 7636]. The verifier is
//! handed to [`crate::Client::callback`] checks; the challenge rides on the
//! authorization request.
//!
//! [RFC 7636]: https://www.rfc-editor.org/rfc/rfc7636

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a high-entropy PKCE code verifier.
#[must_use]
pub fn code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes[..]);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Compute the `S256` code challenge for a verifier.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Appendix B of RFC 7636.
    #[test]
    fn rfc7636_challenge() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(code_challenge(verifier), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn verifier_length() {
        assert_eq!(code_verifier().len(), 43);
    }
}
