//! # Request Objects
//!
//! JWT-secured authorization requests, RFC 9101. The payload is the
//! authorization request parameters with `iss`, `aud`, `client_id`, `jti`,
//! `iat`, and `exp` filled in; the JWT is signed under
//! `request_object_signing_alg` (default `none`) and optionally nested in a
//! JWE addressed to the Provider.

use serde_json::{Map, Value};

use super::Client;
use crate::core::generate;
use crate::error::{Result, RpError};
use crate::jose::jws::SigningKey;
use crate::jose::{Header, jwe, jwk, jws};

/// Lifetime of a request object.
const REQUEST_OBJECT_LIFETIME: i64 = 300;

impl Client {
    /// Produce a request object for the given authorization request
    /// payload. Caller-supplied members override the generated defaults.
    ///
    /// # Errors
    ///
    /// Fails when the configured algorithms are unsupported or no suitable
    /// key is available.
    pub fn request_object(&self, payload: Map<String, Value>) -> Result<String> {
        let metadata = self.metadata();
        let now = self.now();

        let mut claims = Map::new();
        claims.insert("iss".to_string(), Value::String(metadata.client_id.clone()));
        claims.insert("aud".to_string(), Value::String(self.issuer().issuer.clone()));
        claims.insert("client_id".to_string(), Value::String(metadata.client_id.clone()));
        claims.insert("jti".to_string(), Value::String(generate::jti()));
        claims.insert("iat".to_string(), Value::from(now));
        claims.insert("exp".to_string(), Value::from(now + REQUEST_OBJECT_LIFETIME));
        for (name, value) in payload {
            claims.insert(name, value);
        }

        let alg = metadata.request_object_signing_alg.as_deref().unwrap_or("none");
        let mut header = Header::from_alg(alg);
        header.typ = Some("oauth-authz-req+jwt".to_string());

        let signed = match alg {
            "none" => jws::sign(&header, &claims, &SigningKey::None)?,
            alg if alg.starts_with("HS") => {
                let key = self.secret_for_alg(alg)?;
                let secret = key.secret_bytes()?;
                jws::sign(&header, &claims, &SigningKey::Secret(&secret))?
            }
            alg => {
                let jwks = self.key_set().ok_or_else(|| {
                    RpError::Config(format!(
                        "a client jwks is required to sign request objects with {alg}"
                    ))
                })?;
                let key = jwks.signing_key(alg).ok_or_else(|| {
                    RpError::Config(format!("no key in the client jwks can sign with {alg}"))
                })?;
                header.kid = key.kid.clone();
                jws::sign(&header, &claims, &SigningKey::Key(key))?
            }
        };

        let Some(enc_alg) = metadata.request_object_encryption_alg.as_deref() else {
            return Ok(signed);
        };
        let enc = metadata.request_object_encryption_enc.as_deref().unwrap_or("A128CBC-HS256");

        let key = if enc_alg.starts_with("RSA") || enc_alg.starts_with("ECDH") {
            let header = Header {
                alg: enc_alg.to_string(),
                enc: Some(enc.to_string()),
                ..Header::default()
            };
            self.issuer()
                .jwks
                .lookup(&header)
                .or_else(|| {
                    // fall back on key type alone for sets without use/alg hints
                    let kty = jwk::kty_for_alg(enc_alg)?;
                    self.issuer().jwks.keys.iter().find(|key| key.kty == kty)
                })
                .ok_or(RpError::NoMatchingKey)?
                .clone()
        } else if enc_alg == "dir" {
            self.secret_for_alg(enc)?
        } else {
            self.secret_for_alg(enc_alg)?
        };

        // nested JWT, so the inner media type is declared
        jwe::encrypt(signed.as_bytes(), enc_alg, enc, &key, Some("JWT")).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientMetadata;
    use crate::issuer::Issuer;
    use crate::jose::jwk::Jwk;

    fn issuer() -> Issuer {
        Issuer {
            issuer: "https://op.example.com".to_string(),
            ..Issuer::default()
        }
    }

    #[test]
    fn unsigned_request_object_roundtrip() {
        let client =
            Client::new(issuer(), ClientMetadata::new("rp")).expect("should construct");

        let mut payload = Map::new();
        payload.insert("response_type".to_string(), Value::String("code".to_string()));
        payload.insert("state".to_string(), Value::String("abc".to_string()));

        let jwt = client.request_object(payload).expect("should produce");
        assert!(jwt.ends_with('.'));

        let decoded = jws::decode(&jwt).expect("should decode");
        assert_eq!(decoded.header.alg, "none");
        assert_eq!(decoded.header.typ.as_deref(), Some("oauth-authz-req+jwt"));
        assert_eq!(decoded.payload.get("iss"), Some(&Value::String("rp".to_string())));
        assert_eq!(decoded.payload.get("client_id"), Some(&Value::String("rp".to_string())));
        assert_eq!(
            decoded.payload.get("aud"),
            Some(&Value::String("https://op.example.com".to_string()))
        );
        assert_eq!(decoded.payload.get("state"), Some(&Value::String("abc".to_string())));
        assert!(decoded.payload.contains_key("jti"));
        assert!(decoded.payload.contains_key("iat"));
        assert!(decoded.payload.contains_key("exp"));
    }

    #[test]
    fn caller_overrides_win() {
        let client =
            Client::new(issuer(), ClientMetadata::new("rp")).expect("should construct");

        let mut payload = Map::new();
        payload.insert("aud".to_string(), Value::String("urn:other".to_string()));
        let jwt = client.request_object(payload).expect("should produce");
        let decoded = jws::decode(&jwt).expect("should decode");
        assert_eq!(decoded.payload.get("aud"), Some(&Value::String("urn:other".to_string())));
    }

    #[test]
    fn symmetric_encryption_roundtrip() {
        let metadata = ClientMetadata {
            client_secret: Some("a very well kept secret".to_string()),
            request_object_encryption_alg: Some("dir".to_string()),
            request_object_encryption_enc: Some("A128GCM".to_string()),
            ..ClientMetadata::new("rp")
        };
        let client = Client::new(issuer(), metadata).expect("should construct");

        let jwt = client.request_object(Map::new()).expect("should produce");
        assert_eq!(jwt.matches('.').count(), 4);

        let key = client.secret_for_alg("A128GCM").expect("derived key");
        let decrypted = jwe::decrypt(&jwt, &key).expect("should decrypt");
        assert_eq!(decrypted.header.cty.as_deref(), Some("JWT"));

        let inner = String::from_utf8(decrypted.plaintext).expect("utf8");
        let decoded = jws::decode(&inner).expect("inner JWS decodes");
        assert_eq!(decoded.payload.get("iss"), Some(&Value::String("rp".to_string())));
    }

    #[test]
    fn hs_signed_request_object() {
        let metadata = ClientMetadata {
            client_secret: Some("a very well kept secret".to_string()),
            request_object_signing_alg: Some("HS256".to_string()),
            ..ClientMetadata::new("rp")
        };
        let client = Client::new(issuer(), metadata).expect("should construct");

        let jwt = client.request_object(Map::new()).expect("should produce");
        let decoded = jws::decode(&jwt).expect("should decode");
        assert_eq!(decoded.header.alg, "HS256");

        let key = Jwk::symmetric(b"a very well kept secret");
        jws::verify(&decoded, &key).expect("MAC verifies");
    }
}
