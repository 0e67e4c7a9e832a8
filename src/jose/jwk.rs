//! # JSON Web Keys
//!
//! Key records per [RFC 7517] and the best-match selection used when picking
//! a verification or signing key out of a set. A single [`Jwk`] type covers
//! RSA, EC, OKP, and symmetric `oct` keys; absent members are `None`.
//!
//! [RFC 7517]: https://www.rfc-editor.org/rfc/rfc7517

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::Header;
use crate::error::RpError;

/// A JSON Web Key.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type: `RSA`, `EC`, `OKP`, or `oct`.
    pub kty: String,

    /// Key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Intended use: `sig` or `enc`.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// RSA modulus, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Private exponent (RSA) or private key (EC/OKP), base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,

    /// RSA first prime factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,

    /// RSA second prime factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,

    /// RSA first CRT exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,

    /// RSA second CRT exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,

    /// RSA CRT coefficient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,

    /// Symmetric key value, base64url.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,

    /// X.509 certificate chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
}

impl Jwk {
    /// Wrap raw secret bytes as a symmetric `oct` key.
    #[must_use]
    pub fn symmetric(bytes: &[u8]) -> Self {
        Self {
            kty: "oct".to_string(),
            k: Some(Base64UrlUnpadded::encode_string(bytes)),
            ..Self::default()
        }
    }

    /// `true` for symmetric (`oct`) keys.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.kty == "oct"
    }

    /// `true` when the key carries private material.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// The public portion of the key, with all private members removed.
    #[must_use]
    pub fn public(&self) -> Self {
        Self {
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            k: None,
            ..self.clone()
        }
    }

    /// Decode the symmetric key value.
    ///
    /// # Errors
    ///
    /// Fails when the key is not `oct` or `k` is not valid base64url.
    pub fn secret_bytes(&self) -> Result<Vec<u8>, RpError> {
        let k = self
            .k
            .as_deref()
            .ok_or_else(|| RpError::Config("key has no symmetric key value".to_string()))?;
        decode_b64(k, "k")
    }

    /// Reconstruct an RSA public key from the `n`/`e` members.
    ///
    /// # Errors
    ///
    /// Fails when members are missing, malformed, or do not form a valid key.
    pub fn rsa_public(&self) -> Result<RsaPublicKey, RpError> {
        let n = biguint(self.n.as_deref(), "n")?;
        let e = biguint(self.e.as_deref(), "e")?;
        RsaPublicKey::new(n, e).map_err(|e| RpError::Jwt(format!("invalid RSA public key: {e}")))
    }

    /// Reconstruct an RSA private key from the JWK private members.
    ///
    /// # Errors
    ///
    /// Fails when members are missing, malformed, or do not form a valid key.
    pub fn rsa_private(&self) -> Result<RsaPrivateKey, RpError> {
        let n = biguint(self.n.as_deref(), "n")?;
        let e = biguint(self.e.as_deref(), "e")?;
        let d = biguint(self.d.as_deref(), "d")?;
        let p = biguint(self.p.as_deref(), "p")?;
        let q = biguint(self.q.as_deref(), "q")?;
        RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| RpError::Jwt(format!("invalid RSA private key: {e}")))
    }
}

fn decode_b64(value: &str, member: &str) -> Result<Vec<u8>, RpError> {
    Base64UrlUnpadded::decode_vec(value)
        .map_err(|_| RpError::Jwt(format!("JWK member {member} is not valid base64url")))
}

fn biguint(value: Option<&str>, member: &str) -> Result<BigUint, RpError> {
    let value =
        value.ok_or_else(|| RpError::Config(format!("JWK is missing the {member} member")))?;
    Ok(BigUint::from_bytes_be(&decode_b64(value, member)?))
}

/// A JSON Web Key Set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwks {
    /// Keys in the set.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Select the best verification key for a JOSE header.
    ///
    /// Candidates are narrowed by key type (derived from the header `alg`),
    /// then by `kid` when the header names one. Among the remainder, a key
    /// whose own `alg` matches is preferred, then one whose `use` fits.
    #[must_use]
    pub fn lookup(&self, header: &Header) -> Option<&Jwk> {
        let kty = kty_for_alg(&header.alg)?;
        let use_ = if header.enc.is_some() { "enc" } else { "sig" };

        self.keys
            .iter()
            .filter(|key| key.kty == kty)
            .filter(|key| match (&header.kid, &key.kid) {
                (Some(wanted), Some(kid)) => wanted == kid,
                (Some(_), None) | (None, _) => true,
            })
            .filter(|key| key.alg.as_ref().is_none_or(|alg| *alg == header.alg))
            .filter(|key| key.use_.as_ref().is_none_or(|u| u == use_))
            .max_by_key(|key| {
                let mut score = 0;
                if key.alg.as_deref() == Some(header.alg.as_str()) {
                    score += 2;
                }
                if key.use_.as_deref() == Some(use_) {
                    score += 1;
                }
                score
            })
    }

    /// Select a private key capable of producing signatures under `alg`.
    #[must_use]
    pub fn signing_key(&self, alg: &str) -> Option<&Jwk> {
        self.key_for(alg, "sig")
    }

    /// Select a key for key-management under `alg`.
    #[must_use]
    pub fn encryption_key(&self, alg: &str) -> Option<&Jwk> {
        self.key_for(alg, "enc")
    }

    fn key_for(&self, alg: &str, use_: &str) -> Option<&Jwk> {
        let kty = kty_for_alg(alg)?;
        let crv = crv_for_alg(alg);
        self.keys
            .iter()
            .filter(|key| key.kty == kty)
            .filter(|key| crv.is_none() || key.crv.as_deref() == crv)
            .filter(|key| key.alg.as_ref().is_none_or(|a| a == alg))
            .find(|key| key.use_.as_ref().is_none_or(|u| u == use_))
    }

    /// The public portion of the set, suitable for publication.
    #[must_use]
    pub fn public_jwks(&self) -> Self {
        Self {
            keys: self.keys.iter().map(Jwk::public).collect(),
        }
    }
}

/// Key type implied by a JOSE algorithm.
#[must_use]
pub fn kty_for_alg(alg: &str) -> Option<&'static str> {
    match alg {
        a if a.starts_with("RS") || a.starts_with("PS") || a.starts_with("RSA") => Some("RSA"),
        a if a.starts_with("ES") || a.starts_with("ECDH") => Some("EC"),
        a if a.starts_with("HS") || a.starts_with('A') || a == "dir" => Some("oct"),
        "EdDSA" => Some("OKP"),
        _ => None,
    }
}

/// Curve implied by an EC signature algorithm.
#[must_use]
pub const fn crv_for_alg(alg: &str) -> Option<&'static str> {
    match alg.as_bytes() {
        b"ES256" => Some("P-256"),
        b"ES384" => Some("P-384"),
        b"ES512" => Some("P-521"),
        _ => None,
    }
}
