//! # Issuer
//!
//! The Relying Party's view of an OpenID Provider: the issuer identifier,
//! its endpoints, its signing keys, and the algorithm support it advertises.
//! Metadata discovery proper is an external concern; this module carries the
//! record a discovery layer produces, plus the minimal fetch the global
//! registry needs when resolving distributed claims from issuers seen for
//! the first time.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{OpError, Result, RpError};
use crate::jose::jwk::{Jwk, Jwks};
use crate::jose::Header;

/// OpenID Provider metadata and key material, as consumed by the client.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Issuer {
    /// Issuer identifier. Compared byte-for-byte against `iss` claims.
    pub issuer: String,

    /// OAuth 2.0 authorization endpoint.
    pub authorization_endpoint: Option<String>,

    /// OAuth 2.0 token endpoint.
    pub token_endpoint: Option<String>,

    /// OpenID Connect userinfo endpoint.
    pub userinfo_endpoint: Option<String>,

    /// RP-initiated logout endpoint.
    pub end_session_endpoint: Option<String>,

    /// RFC 8628 device authorization endpoint.
    pub device_authorization_endpoint: Option<String>,

    /// RFC 7662 introspection endpoint.
    pub introspection_endpoint: Option<String>,

    /// RFC 7009 revocation endpoint.
    pub revocation_endpoint: Option<String>,

    /// Dynamic client registration endpoint.
    pub registration_endpoint: Option<String>,

    /// Location of the Provider's JWKS.
    pub jwks_uri: Option<String>,

    /// The Provider's resolved key set.
    #[serde(skip_serializing_if = "jwks_is_empty")]
    pub jwks: Jwks,

    /// Alternative endpoints to use when the client holds an mTLS identity.
    pub mtls_endpoint_aliases: Option<MtlsEndpointAliases>,

    /// Client authentication methods the token endpoint accepts.
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// JWS algorithms accepted for client authentication assertions.
    pub token_endpoint_auth_signing_alg_values_supported: Option<Vec<String>>,

    /// Client authentication methods the introspection endpoint accepts.
    pub introspection_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// JWS algorithms accepted for introspection client assertions.
    pub introspection_endpoint_auth_signing_alg_values_supported: Option<Vec<String>>,

    /// Client authentication methods the revocation endpoint accepts.
    pub revocation_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// JWS algorithms accepted for revocation client assertions.
    pub revocation_endpoint_auth_signing_alg_values_supported: Option<Vec<String>>,

    /// ID Token signing algorithms the Provider can produce.
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,

    /// Any further metadata the Provider advertises.
    #[serde(flatten)]
    pub other: serde_json::Map<String, Value>,
}

fn jwks_is_empty(jwks: &Jwks) -> bool {
    jwks.keys.is_empty()
}

/// Endpoint aliases for mutual-TLS clients, RFC 8705 §5.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MtlsEndpointAliases {
    /// mTLS token endpoint.
    pub token_endpoint: Option<String>,

    /// mTLS userinfo endpoint.
    pub userinfo_endpoint: Option<String>,

    /// mTLS revocation endpoint.
    pub revocation_endpoint: Option<String>,

    /// mTLS introspection endpoint.
    pub introspection_endpoint: Option<String>,

    /// mTLS device authorization endpoint.
    pub device_authorization_endpoint: Option<String>,
}

impl Issuer {
    /// Select the verification key best matching a JOSE header.
    ///
    /// # Errors
    ///
    /// [`RpError::NoMatchingKey`] when no key in the Provider's JWKS fits.
    pub fn key(&self, header: &Header) -> Result<&Jwk, RpError> {
        self.jwks.lookup(header).ok_or(RpError::NoMatchingKey)
    }

    /// Fetch an issuer's configuration and keys from its well-known
    /// location.
    ///
    /// This is the minimal fetch used for cross-issuer distributed-claim
    /// resolution; a full discovery front end remains an external concern.
    ///
    /// # Errors
    ///
    /// Fails when the configuration or JWKS cannot be fetched or parsed.
    pub async fn discover(identifier: &str, http: &reqwest::Client) -> Result<Self> {
        let config_url = if identifier.contains("/.well-known/") {
            identifier.to_string()
        } else {
            format!("{}/.well-known/openid-configuration", identifier.trim_end_matches('/'))
        };
        debug!(%config_url, "discovering issuer");

        let mut issuer: Self = get_json(http, &config_url).await?;
        if let Some(jwks_uri) = &issuer.jwks_uri {
            issuer.jwks = get_json(http, jwks_uri).await?;
        }
        Ok(issuer)
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client, url: &str,
) -> Result<T> {
    let response = http
        .get(url)
        .header(http::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| OpError::transport(e.to_string()))?;

    let status = response.status();
    let body = response.bytes().await.map_err(|e| OpError::transport(e.to_string()))?;
    if !status.is_success() {
        return Err(OpError::from_response(
            "200 OK",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            &body,
        )
        .into());
    }
    serde_json::from_slice(&body)
        .map_err(|e| RpError::Jwt(format!("failed to parse response from {url}: {e}")).into())
}

/// Global issuer registry: `iss` identifier to issuer, append-only.
///
/// Populated by [`register`] for issuers the application configures, and by
/// distributed-claim resolution for issuers met along the way.
pub mod registry {
    use super::{Arc, HashMap, Issuer, OnceLock, RwLock};

    fn table() -> &'static RwLock<HashMap<String, Arc<Issuer>>> {
        static TABLE: OnceLock<RwLock<HashMap<String, Arc<Issuer>>>> = OnceLock::new();
        TABLE.get_or_init(|| RwLock::new(HashMap::new()))
    }

    /// Look up a previously-seen issuer.
    #[must_use]
    pub fn get(issuer: &str) -> Option<Arc<Issuer>> {
        table().read().ok()?.get(issuer).cloned()
    }

    /// Cache an issuer, returning the shared handle.
    ///
    /// An already-registered identifier keeps its first registration;
    /// entries are value-equivalent by key so the race is harmless.
    pub fn register(issuer: Issuer) -> Arc<Issuer> {
        let key = issuer.issuer.clone();
        let entry = Arc::new(issuer);
        let Ok(mut guard) = table().write() else {
            return entry;
        };
        guard.entry(key).or_insert_with(|| Arc::clone(&entry)).clone()
    }
}
