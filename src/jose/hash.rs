//! # OIDC Artifact Hashes
//!
//! `at_hash`, `c_hash`, and `s_hash` computation and verification: the
//! left-most half of the companion artifact's digest, base64url-encoded. The
//! digest is the SHA-2 function matching the bit length of the JWS `alg`
//! that protects the ID Token.

use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::RpError;

/// Compute the left-half hash of an artifact under the digest tied to `alg`.
///
/// # Errors
///
/// Fails when no digest length can be derived from the algorithm name.
pub fn left_half(alg: &str, artifact: &str) -> Result<String, RpError> {
    let digest = match digest_bits(alg)? {
        256 => Sha256::digest(artifact.as_bytes()).to_vec(),
        384 => Sha384::digest(artifact.as_bytes()).to_vec(),
        _ => Sha512::digest(artifact.as_bytes()).to_vec(),
    };
    Ok(Base64UrlUnpadded::encode_string(&digest[..digest.len() / 2]))
}

/// Verify a hash claim against its companion artifact.
///
/// # Errors
///
/// [`RpError::HashMismatch`] when the computed value differs from the claim.
pub fn validate(
    name: &'static str, claimed: &str, alg: &str, artifact: &str,
) -> Result<(), RpError> {
    let expected = left_half(alg, artifact)?;
    if expected == claimed {
        Ok(())
    } else {
        Err(RpError::HashMismatch {
            name,
            expected,
            got: claimed.to_string(),
        })
    }
}

/// Digest bit length tied to a JWS algorithm name.
fn digest_bits(alg: &str) -> Result<u32, RpError> {
    // EdDSA (Ed25519) signatures digest with SHA-512
    if alg == "EdDSA" {
        return Ok(512);
    }
    let digits: String = alg.chars().skip_while(|c| !c.is_ascii_digit()).take_while(char::is_ascii_digit).collect();
    match digits.parse() {
        Ok(bits @ (256 | 384 | 512)) => Ok(bits),
        _ => Err(RpError::UnsupportedAlgorithm(alg.to_string())),
    }
}
