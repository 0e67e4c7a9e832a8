//! # JWS Compact Serialization
//!
//! Signing and verification of compact JWS artifacts. Supported algorithms
//! are `HS256/384/512`, `RS256/384/512`, `PS256/384/512`, `ES256/384`,
//! `EdDSA` (verification), and the unsecured `none`.

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use p256::pkcs8::EncodePrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use serde_json::{Map, Value};

use super::jwk::Jwk;
use super::Header;
use crate::error::RpError;

/// A parsed-but-unverified compact JWS.
#[derive(Clone, Debug)]
pub struct DecodedJws {
    /// Protected header.
    pub header: Header,

    /// Decoded payload claims.
    pub payload: Map<String, Value>,

    /// The signing input, `base64url(header) || '.' || base64url(payload)`.
    pub signing_input: String,

    /// Signature segment, still base64url-encoded.
    pub signature: String,
}

/// Key material for producing a signature.
pub enum SigningKey<'a> {
    /// The unsecured `none` algorithm.
    None,

    /// Raw symmetric secret for `HS*` MACs.
    Secret(&'a [u8]),

    /// A private RSA or EC JWK.
    Key(&'a Jwk),
}

/// Split and decode a compact JWS without verifying it.
///
/// # Errors
///
/// Fails when the input is not three base64url segments carrying a JSON
/// header and JSON object payload.
pub fn decode(compact: &str) -> Result<DecodedJws, RpError> {
    let parts: Vec<&str> = compact.split('.').collect();
    let [header, payload, signature] = parts.as_slice() else {
        return Err(RpError::Jwt("JWT is not a valid compact serialization".to_string()));
    };

    let header: Header = serde_json::from_slice(&segment(header)?)
        .map_err(|e| RpError::Jwt(format!("failed to parse JWT header: {e}")))?;
    let payload: Map<String, Value> = serde_json::from_slice(&segment(payload)?)
        .map_err(|e| RpError::Jwt(format!("failed to parse JWT payload: {e}")))?;

    let signing_input_len = compact.len() - signature.len() - 1;
    Ok(DecodedJws {
        header,
        payload,
        signing_input: compact[..signing_input_len].to_string(),
        signature: (*signature).to_string(),
    })
}

/// Decode a single base64url segment.
///
/// # Errors
///
/// Fails on invalid base64url.
pub fn segment(part: &str) -> Result<Vec<u8>, RpError> {
    Base64UrlUnpadded::decode_vec(part)
        .map_err(|_| RpError::Jwt("JWT segment is not valid base64url".to_string()))
}

/// Verify a decoded JWS against a key, using the header `alg`.
///
/// Any verification failure is reported as the single generic
/// [`RpError::SignatureVerification`]; underlying JOSE diagnostics are not
/// surfaced.
///
/// # Errors
///
/// [`RpError::UnsupportedAlgorithm`] for algorithms outside the supported
/// set, [`RpError::SignatureVerification`] otherwise.
pub fn verify(jws: &DecodedJws, key: &Jwk) -> Result<(), RpError> {
    let algorithm = algorithm(&jws.header.alg)?;
    let decoding_key = decoding_key(key)?;

    let valid =
        jsonwebtoken::crypto::verify(&jws.signature, jws.signing_input.as_bytes(), &decoding_key, algorithm)
            .unwrap_or(false);
    if valid { Ok(()) } else { Err(RpError::SignatureVerification) }
}

/// Sign claims under a header, producing a compact JWS.
///
/// With [`SigningKey::None`] the signature segment is empty, as RFC 7515
/// specifies for the `none` algorithm.
///
/// # Errors
///
/// Fails when the header algorithm is unsupported or the key cannot be used
/// with it.
pub fn sign(header: &Header, claims: &Map<String, Value>, key: &SigningKey<'_>) -> Result<String, RpError> {
    let header_json = serde_json::to_vec(header)
        .map_err(|e| RpError::Jwt(format!("failed to serialize JWT header: {e}")))?;
    let payload_json = serde_json::to_vec(claims)
        .map_err(|e| RpError::Jwt(format!("failed to serialize JWT payload: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        Base64UrlUnpadded::encode_string(&header_json),
        Base64UrlUnpadded::encode_string(&payload_json)
    );

    let signature = match key {
        SigningKey::None => String::new(),
        SigningKey::Secret(secret) => {
            let algorithm = algorithm(&header.alg)?;
            jsonwebtoken::crypto::sign(
                signing_input.as_bytes(),
                &EncodingKey::from_secret(secret),
                algorithm,
            )
            .map_err(|e| RpError::Jwt(format!("failed to sign JWT: {e}")))?
        }
        SigningKey::Key(jwk) => {
            let algorithm = algorithm(&header.alg)?;
            jsonwebtoken::crypto::sign(signing_input.as_bytes(), &encoding_key(jwk)?, algorithm)
                .map_err(|e| RpError::Jwt(format!("failed to sign JWT: {e}")))?
        }
    };

    Ok(format!("{signing_input}.{signature}"))
}

/// Map an `alg` string onto the JWS algorithm set.
///
/// # Errors
///
/// [`RpError::UnsupportedAlgorithm`] when outside the supported set.
pub fn algorithm(alg: &str) -> Result<Algorithm, RpError> {
    alg.parse().map_err(|_| RpError::UnsupportedAlgorithm(alg.to_string()))
}

fn decoding_key(key: &Jwk) -> Result<DecodingKey, RpError> {
    if key.is_symmetric() {
        return Ok(DecodingKey::from_secret(&key.secret_bytes()?));
    }

    // jsonwebtoken consumes public keys in its own JWK representation
    let value = serde_json::to_value(key.public())
        .map_err(|e| RpError::Jwt(format!("failed to serialize JWK: {e}")))?;
    let jwk: jsonwebtoken::jwk::Jwk = serde_json::from_value(value)
        .map_err(|e| RpError::Jwt(format!("unusable verification key: {e}")))?;
    DecodingKey::from_jwk(&jwk).map_err(|e| RpError::Jwt(format!("unusable verification key: {e}")))
}

fn encoding_key(key: &Jwk) -> Result<EncodingKey, RpError> {
    if !key.is_private() {
        return Err(RpError::Config("signing requires a private key".to_string()));
    }

    match key.kty.as_str() {
        "RSA" => {
            let private = key.rsa_private()?;
            let der = private
                .to_pkcs1_der()
                .map_err(|e| RpError::Jwt(format!("failed to encode RSA key: {e}")))?;
            Ok(EncodingKey::from_rsa_der(der.as_bytes()))
        }
        "EC" => {
            let jwk_json = serde_json::to_string(key)
                .map_err(|e| RpError::Jwt(format!("failed to serialize JWK: {e}")))?;
            let der = match key.crv.as_deref() {
                Some("P-256") => p256::SecretKey::from_jwk_str(&jwk_json)
                    .map_err(|e| RpError::Jwt(format!("unusable EC key: {e}")))?
                    .to_pkcs8_der()
                    .map_err(|e| RpError::Jwt(format!("failed to encode EC key: {e}")))?,
                Some("P-384") => p384::SecretKey::from_jwk_str(&jwk_json)
                    .map_err(|e| RpError::Jwt(format!("unusable EC key: {e}")))?
                    .to_pkcs8_der()
                    .map_err(|e| RpError::Jwt(format!("failed to encode EC key: {e}")))?,
                other => {
                    return Err(RpError::UnsupportedAlgorithm(format!(
                        "EC curve {}",
                        other.unwrap_or("unknown")
                    )));
                }
            };
            Ok(EncodingKey::from_ec_der(der.as_bytes()))
        }
        other => Err(RpError::UnsupportedAlgorithm(format!("{other} signing keys"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hs256_sign_verify_roundtrip() {
        let header = Header::from_alg("HS256");
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::String("u".to_string()));

        let secret = b"top secret".as_slice();
        let jwt = sign(&header, &claims, &SigningKey::Secret(secret)).expect("should sign");

        let decoded = decode(&jwt).expect("should decode");
        assert_eq!(decoded.header.alg, "HS256");
        assert_eq!(decoded.payload.get("sub"), Some(&Value::String("u".to_string())));

        let key = Jwk::symmetric(secret);
        verify(&decoded, &key).expect("should verify");
    }

    #[test]
    fn tampered_payload_fails() {
        let header = Header::from_alg("HS256");
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::String("u".to_string()));

        let secret = b"top secret".as_slice();
        let jwt = sign(&header, &claims, &SigningKey::Secret(secret)).expect("should sign");

        let mut parts: Vec<String> = jwt.split('.').map(ToString::to_string).collect();
        parts[1] = Base64UrlUnpadded::encode_string(br#"{"sub":"attacker"}"#);
        let forged = parts.join(".");

        let decoded = decode(&forged).expect("should decode");
        let key = Jwk::symmetric(secret);
        assert!(matches!(verify(&decoded, &key), Err(RpError::SignatureVerification)));
    }

    #[test]
    fn alg_none_has_empty_signature() {
        let header = Header::from_alg("none");
        let claims = Map::new();
        let jwt = sign(&header, &claims, &SigningKey::None).expect("should sign");
        assert!(jwt.ends_with('.'));
        assert_eq!(jwt.matches('.').count(), 2);
    }

    #[test]
    fn unsupported_algorithm() {
        assert!(matches!(algorithm("ES256K"), Err(RpError::UnsupportedAlgorithm(_))));
    }
}
