//! # Client Authentication
//!
//! Produces the request enrichments the configured
//! `*_endpoint_auth_method` demands for calls to the token, introspection,
//! revocation, and device authorization endpoints: body fields, an HTTP
//! Basic header, a signed or MACed JWT assertion, or dispatch over mutual
//! TLS.

use serde_json::{Map, Value};

use super::Client;
use crate::core::{generate, urlencode};
use crate::error::RpError;
use crate::http;
use crate::jose::jws::{self, SigningKey};
use crate::jose::Header;

/// Lifetime of a client authentication JWT assertion.
const ASSERTION_LIFETIME: i64 = 60;

/// Claims the caller may overlay onto the generated assertion.
#[derive(Clone, Debug, Default)]
pub struct AuthenticationExtras {
    /// Extra or overriding claims for `client_secret_jwt` /
    /// `private_key_jwt` assertions.
    pub client_assertion_payload: Option<Map<String, Value>>,
}

/// The endpoints that take client authentication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AuthEndpoint {
    Token,
    Introspection,
    Revocation,
}

impl AuthEndpoint {
    const fn name(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Introspection => "introspection",
            Self::Revocation => "revocation",
        }
    }
}

/// Authentication material for one request.
#[derive(Debug, Default)]
pub(crate) struct RequestAuth {
    /// Form fields to merge into the body.
    pub form: Vec<(String, String)>,

    /// `Authorization: Basic` header value.
    pub basic: Option<String>,

    /// Dispatch the request over the mTLS connection.
    pub mtls: bool,
}

impl Client {
    /// The effective authentication method for an endpoint, falling back to
    /// the token endpoint's when the specific one is unset.
    pub(crate) fn auth_method(&self, endpoint: AuthEndpoint) -> &str {
        let metadata = self.metadata();
        let specific = match endpoint {
            AuthEndpoint::Token => None,
            AuthEndpoint::Introspection => metadata.introspection_endpoint_auth_method.as_deref(),
            AuthEndpoint::Revocation => metadata.revocation_endpoint_auth_method.as_deref(),
        };
        specific.unwrap_or_else(|| metadata.token_auth_method())
    }

    /// Produce the enrichments for an authenticated request to `endpoint`,
    /// reachable at `endpoint_url`.
    pub(crate) fn auth_for(
        &self, endpoint: AuthEndpoint, endpoint_url: &str,
        assertion_payload: Option<&Map<String, Value>>,
    ) -> Result<RequestAuth, RpError> {
        let metadata = self.metadata();
        let client_id = metadata.client_id.clone();

        match self.auth_method(endpoint) {
            "none" => Ok(RequestAuth {
                form: vec![("client_id".to_string(), client_id)],
                ..RequestAuth::default()
            }),
            "client_secret_post" => {
                let secret = self.require_secret("client_secret_post")?;
                Ok(RequestAuth {
                    form: vec![
                        ("client_id".to_string(), client_id),
                        ("client_secret".to_string(), secret.to_string()),
                    ],
                    ..RequestAuth::default()
                })
            }
            "client_secret_basic" => {
                // RFC 6749 §2.3.1: credentials are form-url-encoded before
                // base64
                let secret = self.require_secret("client_secret_basic")?;
                let user = urlencode::form_component(&client_id);
                let password = urlencode::form_component(secret);
                Ok(RequestAuth {
                    basic: Some(http::basic_auth(&user, &password)),
                    ..RequestAuth::default()
                })
            }
            "client_secret_jwt" | "private_key_jwt" => {
                let assertion = self.client_assertion(endpoint, endpoint_url, assertion_payload)?;
                Ok(RequestAuth {
                    form: vec![
                        (
                            "client_assertion_type".to_string(),
                            "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
                        ),
                        ("client_assertion".to_string(), assertion),
                        ("client_id".to_string(), client_id),
                    ],
                    ..RequestAuth::default()
                })
            }
            "tls_client_auth" | "self_signed_tls_client_auth" => Ok(RequestAuth {
                form: vec![("client_id".to_string(), client_id)],
                basic: None,
                mtls: true,
            }),
            other => Err(RpError::Config(format!(
                "unsupported {}_endpoint_auth_method {other}",
                endpoint.name()
            ))),
        }
    }

    /// Build the JWT assertion for `client_secret_jwt` / `private_key_jwt`.
    fn client_assertion(
        &self, endpoint: AuthEndpoint, endpoint_url: &str,
        assertion_payload: Option<&Map<String, Value>>,
    ) -> Result<String, RpError> {
        let metadata = self.metadata();
        let method = self.auth_method(endpoint).to_string();
        let now = self.now();

        let mut claims = Map::new();
        claims.insert("iss".to_string(), Value::String(metadata.client_id.clone()));
        claims.insert("sub".to_string(), Value::String(metadata.client_id.clone()));
        claims.insert("aud".to_string(), Value::String(endpoint_url.to_string()));
        claims.insert("jti".to_string(), Value::String(generate::jti()));
        claims.insert("iat".to_string(), Value::from(now));
        claims.insert("exp".to_string(), Value::from(now + ASSERTION_LIFETIME));
        if let Some(overlay) = assertion_payload {
            for (claim, value) in overlay {
                claims.insert(claim.clone(), value.clone());
            }
        }

        let configured_alg = match endpoint {
            AuthEndpoint::Token => metadata.token_endpoint_auth_signing_alg.as_deref(),
            AuthEndpoint::Introspection => {
                metadata.introspection_endpoint_auth_signing_alg.as_deref()
            }
            AuthEndpoint::Revocation => metadata.revocation_endpoint_auth_signing_alg.as_deref(),
        };
        let supported = match endpoint {
            AuthEndpoint::Token => {
                self.issuer().token_endpoint_auth_signing_alg_values_supported.as_deref()
            }
            AuthEndpoint::Introspection => self
                .issuer()
                .introspection_endpoint_auth_signing_alg_values_supported
                .as_deref(),
            AuthEndpoint::Revocation => {
                self.issuer().revocation_endpoint_auth_signing_alg_values_supported.as_deref()
            }
        };

        if method == "client_secret_jwt" {
            let alg = configured_alg
                .map(ToString::to_string)
                .or_else(|| {
                    supported?.iter().find(|alg| alg.starts_with("HS")).cloned()
                })
                .ok_or_else(|| {
                    RpError::Config(
                        "could not determine a signing algorithm for client_secret_jwt"
                            .to_string(),
                    )
                })?;
            let key = self.secret_for_alg(&alg)?;
            let secret = key.secret_bytes()?;
            return jws::sign(&Header::from_alg(alg), &claims, &SigningKey::Secret(&secret));
        }

        // private_key_jwt
        let jwks = self.key_set().ok_or_else(|| {
            RpError::Config("private_key_jwt requires a client jwks".to_string())
        })?;
        let (alg, key) = match configured_alg {
            Some(alg) => {
                let key = jwks.signing_key(alg).ok_or_else(|| {
                    RpError::Config(format!("no key in the client jwks can sign with {alg}"))
                })?;
                (alg.to_string(), key)
            }
            None => supported
                .into_iter()
                .flatten()
                .find_map(|alg| jwks.signing_key(alg).map(|key| (alg.clone(), key)))
                .ok_or_else(|| {
                    RpError::Config(
                        "could not determine a signing algorithm for private_key_jwt".to_string(),
                    )
                })?,
        };

        let mut header = Header::from_alg(alg);
        header.kid = key.kid.clone();
        jws::sign(&header, &claims, &SigningKey::Key(key))
    }

    fn require_secret(&self, method: &str) -> Result<&str, RpError> {
        self.metadata().client_secret.as_deref().ok_or_else(|| {
            RpError::Config(format!("{method} client authentication method requires a client_secret"))
        })
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
            token_endpoint: Some("https://op.example.com/token".to_string()),
            ..Issuer::default()
        }
    }

    fn client(metadata: ClientMetadata) -> Client {
        Client::new(issuer(), metadata).expect("should construct")
    }

    #[test]
    fn none_sends_client_id_only() {
        let metadata = ClientMetadata {
            token_endpoint_auth_method: Some("none".to_string()),
            ..ClientMetadata::new("rp")
        };
        let auth = client(metadata)
            .auth_for(AuthEndpoint::Token, "https://op.example.com/token", None)
            .expect("should enrich");
        assert_eq!(auth.form, vec![("client_id".to_string(), "rp".to_string())]);
        assert!(auth.basic.is_none());
        assert!(!auth.mtls);
    }

    #[test]
    fn basic_encodes_credentials_before_base64() {
        let metadata = ClientMetadata {
            client_secret: Some("foo bar".to_string()),
            ..ClientMetadata::new("an:identifier")
        };
        let auth = client(metadata)
            .auth_for(AuthEndpoint::Token, "https://op.example.com/token", None)
            .expect("should enrich");
        // base64("an%3Aidentifier:foo+bar")
        assert_eq!(auth.basic.as_deref(), Some("Basic YW4lM0FpZGVudGlmaWVyOmZvbytiYXI="));
    }

    #[test]
    fn secret_jwt_assertion() {
        let metadata = ClientMetadata {
            client_secret: Some("top secret".to_string()),
            token_endpoint_auth_method: Some("client_secret_jwt".to_string()),
            token_endpoint_auth_signing_alg: Some("HS256".to_string()),
            ..ClientMetadata::new("rp")
        };
        let client = client(metadata).with_clock(1_700_000_000);
        let auth = client
            .auth_for(AuthEndpoint::Token, "https://op.example.com/token", None)
            .expect("should enrich");

        let assertion = auth
            .form
            .iter()
            .find(|(name, _)| name == "client_assertion")
            .map(|(_, value)| value.clone())
            .expect("assertion present");
        let decoded = jws::decode(&assertion).expect("should decode");
        assert_eq!(decoded.header.alg, "HS256");
        assert_eq!(decoded.payload.get("iss"), Some(&Value::String("rp".to_string())));
        assert_eq!(decoded.payload.get("sub"), Some(&Value::String("rp".to_string())));
        assert_eq!(
            decoded.payload.get("aud"),
            Some(&Value::String("https://op.example.com/token".to_string()))
        );
        assert_eq!(decoded.payload.get("iat"), Some(&Value::from(1_700_000_000)));
        assert_eq!(decoded.payload.get("exp"), Some(&Value::from(1_700_000_060)));

        let key = Jwk::symmetric(b"top secret");
        jws::verify(&decoded, &key).expect("MAC verifies with the raw secret");

        assert!(auth.form.iter().any(|(name, value)| {
            name == "client_assertion_type"
                && value == "urn:ietf:params:oauth:client-assertion-type:jwt-bearer"
        }));
    }

    #[test]
    fn assertion_payload_overlays_defaults() {
        let metadata = ClientMetadata {
            client_secret: Some("top secret".to_string()),
            token_endpoint_auth_method: Some("client_secret_jwt".to_string()),
            token_endpoint_auth_signing_alg: Some("HS256".to_string()),
            ..ClientMetadata::new("rp")
        };
        let mut overlay = Map::new();
        overlay.insert("aud".to_string(), Value::String("https://op.example.com".to_string()));

        let auth = client(metadata)
            .auth_for(AuthEndpoint::Token, "https://op.example.com/token", Some(&overlay))
            .expect("should enrich");
        let assertion = auth
            .form
            .iter()
            .find(|(name, _)| name == "client_assertion")
            .map(|(_, value)| value.clone())
            .expect("assertion present");
        let decoded = jws::decode(&assertion).expect("should decode");
        assert_eq!(
            decoded.payload.get("aud"),
            Some(&Value::String("https://op.example.com".to_string()))
        );
    }

    #[test]
    fn tls_client_auth_flags_mtls() {
        let metadata = ClientMetadata {
            token_endpoint_auth_method: Some("tls_client_auth".to_string()),
            ..ClientMetadata::new("rp")
        };
        let auth = client(metadata)
            .auth_for(AuthEndpoint::Token, "https://op.example.com/token", None)
            .expect("should enrich");
        assert!(auth.mtls);
        assert_eq!(auth.form, vec![("client_id".to_string(), "rp".to_string())]);
    }

    #[test]
    fn introspection_falls_back_to_token_method() {
        let metadata = ClientMetadata {
            client_secret: Some("s".to_string()),
            token_endpoint_auth_method: Some("client_secret_post".to_string()),
            ..ClientMetadata::new("rp")
        };
        let client = client(metadata);
        assert_eq!(client.auth_method(AuthEndpoint::Introspection), "client_secret_post");
    }

    #[test]
    fn missing_secret_is_fatal() {
        let client = client(ClientMetadata::new("rp"));
        assert!(matches!(
            client.auth_for(AuthEndpoint::Token, "https://op.example.com/token", None),
            Err(RpError::Config(_))
        ));
    }
}
