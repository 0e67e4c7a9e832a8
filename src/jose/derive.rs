//! # Symmetric Key Derivation
//!
//! Keys derived from the `client_secret` for symmetric JOSE operations.
//!
//! AES-based algorithms (`A{n}GCM`, `A{n}KW`, `A{n}GCMKW`, `A{n}CBC-HS{m}`)
//! take a hash of the secret truncated to the key length the algorithm
//! demands; the CBC composites use their HMAC bit length, which is the CEK
//! length RFC 7518 assigns them. Every other symmetric use (`HS*` MACs) takes
//! the raw UTF-8 bytes of the secret.
//!
//! Derivation is deterministic; callers memoize results per bit length.

use sha2::{Digest, Sha256, Sha384, Sha512};

/// Key length in bits demanded by an AES-based `alg`/`enc` identifier, or
/// `None` when the algorithm uses the raw secret.
#[must_use]
pub fn derived_bits(alg: &str) -> Option<u32> {
    let rest = alg.strip_prefix('A')?;
    let (n, suffix) = rest.split_at_checked(3)?;
    let n: u32 = n.parse().ok()?;

    match suffix {
        "GCM" | "KW" | "GCMKW" => Some(n),
        _ => suffix.strip_prefix("CBC-HS").and_then(|m| m.parse().ok()),
    }
}

/// Derive a key of `bits` length from the client secret.
///
/// The digest is sized to cover the requested length: SHA-256 up to 256
/// bits, SHA-384 up to 384, SHA-512 beyond.
#[must_use]
pub fn derived_key(client_secret: &str, bits: u32) -> Vec<u8> {
    let len = (bits / 8) as usize;
    let secret = client_secret.as_bytes();

    let digest = if bits <= 256 {
        Sha256::digest(secret).to_vec()
    } else if bits <= 384 {
        Sha384::digest(secret).to_vec()
    } else {
        Sha512::digest(secret).to_vec()
    };
    digest[..len].to_vec()
}
