//! # Relying Party Client
//!
//! [`Client`] drives the end-to-end interaction with one OpenID Provider:
//! building authorization requests, consuming callbacks, exchanging and
//! refreshing tokens, fetching userinfo and claims, and the device and
//! registration flows. A single client may serve concurrent requests; all
//! shared state is immutable metadata or an idempotent key cache.

pub mod metadata;

mod auth;
mod callback;
mod callback_params;
mod claims;
mod params;
mod register;
mod request_object;
mod token;
mod userinfo;
mod validate;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use chrono::Utc;
use tracing::warn;

pub use self::auth::AuthenticationExtras;
pub use self::callback::{CallbackChecks, CallbackExtras};
pub use self::callback_params::{CallbackBody, CallbackInput, CallbackParams};
pub use self::metadata::ClientMetadata;
pub use self::params::{AuthorizationParameters, EndSessionParameters, IdTokenHint};
pub use self::register::RegistrationOptions;
pub use self::token::RefreshInput;
pub use self::userinfo::{UserinfoOptions, UserinfoToken, UserinfoVia};

use crate::error::{Result, RpError};
use crate::issuer::Issuer;
use crate::jose::derive;
use crate::jose::jwk::{Jwk, Jwks};

/// Clock source, overridable so validation can be pinned in tests.
#[derive(Clone)]
pub(crate) struct Clock(Arc<dyn Fn() -> i64 + Send + Sync>);

impl Default for Clock {
    fn default() -> Self {
        Self(Arc::new(|| Utc::now().timestamp()))
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Clock")
    }
}

/// An OpenID Connect Relying Party bound to one [`Issuer`].
///
/// Cheap to clone; clones share the issuer, metadata, HTTP connections, and
/// key caches.
#[derive(Clone, Debug)]
pub struct Client {
    issuer: Arc<Issuer>,
    metadata: ClientMetadata,
    jwks: Option<Jwks>,
    http: reqwest::Client,
    mtls_http: Option<reqwest::Client>,
    aad_multitenant: bool,
    clock_tolerance: i64,
    derived_keys: Arc<RwLock<HashMap<u32, Jwk>>>,
    secret_key: Arc<OnceLock<Jwk>>,
    clock: Clock,
}

impl Client {
    /// Construct a client for an issuer.
    ///
    /// Metadata invariants are enforced here; see [`ClientMetadata`]. When
    /// the issuer advertises `token_endpoint_auth_methods_supported` and the
    /// configured method is absent while `client_secret_post` is advertised,
    /// the effective method becomes `client_secret_post`.
    ///
    /// # Errors
    ///
    /// Fails on invalid metadata or an auth configuration the issuer cannot
    /// support.
    pub fn new(issuer: impl Into<Arc<Issuer>>, mut metadata: ClientMetadata) -> Result<Self> {
        let issuer = issuer.into();
        metadata.normalize()?;

        if let Some(supported) = &issuer.token_endpoint_auth_methods_supported {
            let configured = metadata.token_auth_method().to_string();
            if !supported.contains(&configured)
                && supported.iter().any(|method| method == "client_secret_post")
            {
                warn!(%configured, "token endpoint auth method not advertised, using client_secret_post");
                metadata.token_endpoint_auth_method = Some("client_secret_post".to_string());
            }
        }

        let client = Self {
            issuer,
            metadata,
            jwks: None,
            http: reqwest::Client::new(),
            mtls_http: None,
            aad_multitenant: false,
            clock_tolerance: 0,
            derived_keys: Arc::new(RwLock::new(HashMap::new())),
            secret_key: Arc::new(OnceLock::new()),
            clock: Clock::default(),
        };
        client.assert_signing_alg_support()?;
        Ok(client)
    }

    /// Attach the client's private key set.
    ///
    /// # Errors
    ///
    /// Fails when the set contains public-only or symmetric keys.
    pub fn jwks(mut self, jwks: Jwks) -> Result<Self> {
        if jwks.keys.iter().any(|key| key.is_symmetric() || !key.is_private()) {
            return Err(RpError::Config(
                "client jwks must only contain private asymmetric keys".to_string(),
            )
            .into());
        }
        self.jwks = Some(jwks);
        Ok(self)
    }

    /// Use a preconfigured HTTP client, e.g. with timeouts or proxies.
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Use an HTTP client holding the mutual-TLS identity for
    /// `tls_client_auth` methods and certificate-bound access tokens.
    #[must_use]
    pub fn mtls_http_client(mut self, http: reqwest::Client) -> Self {
        self.mtls_http = Some(http);
        self
    }

    /// Substitute `{tenantid}` in the expected issuer with the ID Token's
    /// `tid` claim, for Azure AD multitenant issuers.
    #[must_use]
    pub fn aad_multitenant(mut self) -> Self {
        self.aad_multitenant = true;
        self
    }

    /// Allowed clock skew, in seconds, applied symmetrically to timestamp
    /// checks. Defaults to zero.
    #[must_use]
    pub fn clock_tolerance(mut self, seconds: u32) -> Self {
        self.clock_tolerance = i64::from(seconds);
        self
    }

    /// The issuer this client is bound to.
    #[must_use]
    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    /// The client's registered metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ClientMetadata {
        &self.metadata
    }

    /// The client's private key set, when attached.
    #[must_use]
    pub const fn key_set(&self) -> Option<&Jwks> {
        self.jwks.as_ref()
    }

    pub(crate) fn now(&self) -> i64 {
        (self.clock.0)()
    }

    pub(crate) const fn tolerance(&self) -> i64 {
        self.clock_tolerance
    }

    pub(crate) const fn is_aad_multitenant(&self) -> bool {
        self.aad_multitenant
    }

    #[cfg(test)]
    pub(crate) fn with_clock(mut self, now: i64) -> Self {
        self.clock = Clock(Arc::new(move || now));
        self
    }

    /// The HTTP client for an endpoint, honouring the mTLS identity when the
    /// caller asks for it.
    pub(crate) fn http_for(&self, mtls: bool) -> &reqwest::Client {
        if mtls {
            self.mtls_http.as_ref().unwrap_or(&self.http)
        } else {
            &self.http
        }
    }

    pub(crate) fn plain_http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The symmetric key for a JOSE algorithm, derived from `client_secret`
    /// and memoized per derivation length.
    ///
    /// # Errors
    ///
    /// Fails when the client has no `client_secret`.
    pub(crate) fn secret_for_alg(&self, alg: &str) -> Result<Jwk, RpError> {
        let secret = self.metadata.client_secret.as_deref().ok_or_else(|| {
            RpError::Config("client_secret is required for symmetric key derivation".to_string())
        })?;

        if let Some(bits) = derive::derived_bits(alg) {
            if let Some(key) = self
                .derived_keys
                .read()
                .ok()
                .and_then(|cache| cache.get(&bits).cloned())
            {
                return Ok(key);
            }
            let key = Jwk::symmetric(&derive::derived_key(secret, bits));
            if let Ok(mut cache) = self.derived_keys.write() {
                cache.entry(bits).or_insert_with(|| key.clone());
            }
            return Ok(key);
        }

        Ok(self.secret_key.get_or_init(|| Jwk::symmetric(secret.as_bytes())).clone())
    }

    /// Assert the issuer can accept the configured `*_jwt` signing
    /// algorithms.
    fn assert_signing_alg_support(&self) -> Result<(), RpError> {
        let checks = [
            (
                self.metadata.token_auth_method(),
                self.metadata.token_endpoint_auth_signing_alg.as_deref(),
                self.issuer.token_endpoint_auth_signing_alg_values_supported.as_deref(),
                "token_endpoint_auth_signing_alg_values_supported",
            ),
            (
                self.metadata
                    .introspection_endpoint_auth_method
                    .as_deref()
                    .unwrap_or_else(|| self.metadata.token_auth_method()),
                self.metadata.introspection_endpoint_auth_signing_alg.as_deref(),
                self.issuer.introspection_endpoint_auth_signing_alg_values_supported.as_deref(),
                "introspection_endpoint_auth_signing_alg_values_supported",
            ),
            (
                self.metadata
                    .revocation_endpoint_auth_method
                    .as_deref()
                    .unwrap_or_else(|| self.metadata.token_auth_method()),
                self.metadata.revocation_endpoint_auth_signing_alg.as_deref(),
                self.issuer.revocation_endpoint_auth_signing_alg_values_supported.as_deref(),
                "revocation_endpoint_auth_signing_alg_values_supported",
            ),
        ];

        for (method, alg, supported, metadata_name) in checks {
            if !method.ends_with("_jwt") {
                continue;
            }
            match (alg, supported) {
                (Some(alg), Some(supported)) => {
                    if !supported.iter().any(|a| a == alg) {
                        return Err(RpError::Config(format!(
                            "{metadata_name} does not include the configured {alg}"
                        )));
                    }
                }
                (None, None) => {
                    return Err(RpError::Config(format!(
                        "{metadata_name} must be configured on the issuer or an explicit signing alg on the client"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> Issuer {
        Issuer {
            issuer: "https://op.example.com".to_string(),
            token_endpoint: Some("https://op.example.com/token".to_string()),
            ..Issuer::default()
        }
    }

    #[test]
    fn falls_back_to_client_secret_post() {
        let client = Client::new(
            Issuer {
                token_endpoint_auth_methods_supported: Some(vec![
                    "client_secret_post".to_string(),
                    "private_key_jwt".to_string(),
                ]),
                ..issuer()
            },
            ClientMetadata::new("rp"),
        )
        .expect("should construct");
        assert_eq!(client.metadata().token_auth_method(), "client_secret_post");
    }

    #[test]
    fn keeps_advertised_method() {
        let client = Client::new(
            Issuer {
                token_endpoint_auth_methods_supported: Some(vec![
                    "client_secret_basic".to_string(),
                    "client_secret_post".to_string(),
                ]),
                ..issuer()
            },
            ClientMetadata::new("rp"),
        )
        .expect("should construct");
        assert_eq!(client.metadata().token_auth_method(), "client_secret_basic");
    }

    #[test]
    fn secret_jwt_requires_supported_algs() {
        let metadata = ClientMetadata {
            token_endpoint_auth_method: Some("client_secret_jwt".to_string()),
            ..ClientMetadata::new("rp")
        };
        assert!(Client::new(issuer(), metadata).is_err());

        let metadata = ClientMetadata {
            token_endpoint_auth_method: Some("client_secret_jwt".to_string()),
            token_endpoint_auth_signing_alg: Some("HS256".to_string()),
            ..ClientMetadata::new("rp")
        };
        assert!(Client::new(issuer(), metadata).is_ok());
    }

    #[test]
    fn configured_alg_must_be_advertised() {
        let metadata = ClientMetadata {
            token_endpoint_auth_method: Some("client_secret_jwt".to_string()),
            token_endpoint_auth_signing_alg: Some("HS256".to_string()),
            ..ClientMetadata::new("rp")
        };
        let result = Client::new(
            Issuer {
                token_endpoint_auth_signing_alg_values_supported: Some(vec![
                    "HS384".to_string()
                ]),
                ..issuer()
            },
            metadata,
        );
        assert!(result.is_err());
    }

    #[test]
    fn client_jwks_rejects_non_private_keys() {
        let client = Client::new(issuer(), ClientMetadata::new("rp")).expect("should construct");
        let public_only = Jwks {
            keys: vec![Jwk {
                kty: "RSA".to_string(),
                n: Some("abc".to_string()),
                e: Some("AQAB".to_string()),
                ..Jwk::default()
            }],
        };
        assert!(client.jwks(public_only).is_err());

        let client = Client::new(issuer(), ClientMetadata::new("rp")).expect("should construct");
        let symmetric = Jwks {
            keys: vec![Jwk::symmetric(b"secret")],
        };
        assert!(client.jwks(symmetric).is_err());
    }

    #[test]
    fn derived_keys_are_memoized() {
        let metadata = ClientMetadata {
            client_secret: Some("top secret".to_string()),
            ..ClientMetadata::new("rp")
        };
        let client = Client::new(issuer(), metadata).expect("should construct");

        let first = client.secret_for_alg("A128GCM").expect("should derive");
        let second = client.secret_for_alg("A128GCM").expect("should derive");
        assert_eq!(first, second);
        assert_eq!(first.secret_bytes().expect("oct key").len(), 16);

        let raw = client.secret_for_alg("HS256").expect("raw secret");
        assert_eq!(raw.secret_bytes().expect("oct key"), b"top secret");
    }

    #[test]
    fn missing_secret_is_fatal() {
        let client = Client::new(issuer(), ClientMetadata::new("rp")).expect("should construct");
        assert!(matches!(client.secret_for_alg("A128GCM"), Err(RpError::Config(_))));
    }
}
