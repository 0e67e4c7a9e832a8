//! # Random Value Generation
//!
//! Generators for the opaque values a Relying Party mints: `state`, `nonce`,
//! and `jti`. Values are unpredictable and URL-safe.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::Rng;

/// Entropy carried by generated `state` and `nonce` values.
const RANDOM_BYTES: usize = 32;

/// Generate a random base64url string suitable for `state` and `nonce`
/// parameters.
#[must_use]
pub fn random() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::rng().fill(&mut bytes[..]);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Generate a `state` parameter value.
#[must_use]
pub fn state() -> String {
    random()
}

/// Generate a `nonce` parameter value.
#[must_use]
pub fn nonce() -> String {
    random()
}

/// Generate a fresh `jti` claim value for JWT assertions.
#[must_use]
pub fn jti() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_unique_and_urlsafe() {
        let a = random();
        let b = random();
        assert_ne!(a, b);
        assert!(!a.contains(['+', '/', '=']));
        assert_eq!(a.len(), 43); // 32 bytes, unpadded
    }
}
