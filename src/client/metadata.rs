//! # Client Metadata
//!
//! The registered properties of the Relying Party, immutable once the
//! [`crate::Client`] is constructed. Defaults follow OpenID Connect Dynamic
//! Client Registration; common input mistakes (`redirect_uri` for
//! `redirect_uris`, `response_type` for `response_types`) are reconciled at
//! construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpError;

fn default_response_types() -> Vec<String> {
    vec!["code".to_string()]
}

fn default_id_token_alg() -> String {
    "RS256".to_string()
}

const fn is_false(value: &bool) -> bool {
    !*value
}

/// Registered client properties.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientMetadata {
    /// OAuth 2.0 client identifier. Required, non-empty.
    pub client_id: String,

    /// Client secret for symmetric authentication and key derivation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Response types the client will use. Defaults to `["code"]`.
    #[serde(default = "default_response_types")]
    pub response_types: Vec<String>,

    /// Registered redirect URIs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<String>>,

    /// Grant types the client will use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,

    /// Client authentication method for the token endpoint. Defaults to
    /// `client_secret_basic`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,

    /// JWS algorithm for token endpoint `*_jwt` authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_signing_alg: Option<String>,

    /// Client authentication method for the introspection endpoint; falls
    /// back to the token endpoint method when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint_auth_method: Option<String>,

    /// JWS algorithm for introspection `*_jwt` authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint_auth_signing_alg: Option<String>,

    /// Client authentication method for the revocation endpoint; falls back
    /// to the token endpoint method when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint_auth_method: Option<String>,

    /// JWS algorithm for revocation `*_jwt` authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint_auth_signing_alg: Option<String>,

    /// JWS algorithm the Provider signs ID Tokens with. Defaults to `RS256`.
    #[serde(default = "default_id_token_alg")]
    pub id_token_signed_response_alg: String,

    /// JWE key-management algorithm for encrypted ID Tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_alg: Option<String>,

    /// JWE content-encryption algorithm for encrypted ID Tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_enc: Option<String>,

    /// JWS algorithm for signed userinfo responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_signed_response_alg: Option<String>,

    /// JWE key-management algorithm for encrypted userinfo responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_encrypted_response_alg: Option<String>,

    /// JWE content-encryption algorithm for encrypted userinfo responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_encrypted_response_enc: Option<String>,

    /// JWS algorithm for request objects. Defaults to `none` at the point of
    /// use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_object_signing_alg: Option<String>,

    /// JWE key-management algorithm for encrypted request objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_object_encryption_alg: Option<String>,

    /// JWE content-encryption algorithm for encrypted request objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_object_encryption_enc: Option<String>,

    /// Default `max_age` to enforce on every authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_age: Option<u64>,

    /// Require the `auth_time` claim in every ID Token.
    #[serde(skip_serializing_if = "is_false")]
    pub require_auth_time: bool,

    /// The client's access tokens are bound to its TLS certificate,
    /// RFC 8705.
    #[serde(skip_serializing_if = "is_false")]
    pub tls_client_certificate_bound_access_tokens: bool,

    /// Registered post-logout redirect URIs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uris: Option<Vec<String>>,

    /// Singular form of `redirect_uris`, tolerated on input and normalized
    /// away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Singular form of `response_types`, tolerated on input and normalized
    /// away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,

    /// Any further registered properties, e.g. registry-defined extensions
    /// or registration management fields.
    #[serde(flatten)]
    pub other: serde_json::Map<String, Value>,
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            response_types: default_response_types(),
            redirect_uris: None,
            grant_types: None,
            token_endpoint_auth_method: None,
            token_endpoint_auth_signing_alg: None,
            introspection_endpoint_auth_method: None,
            introspection_endpoint_auth_signing_alg: None,
            revocation_endpoint_auth_method: None,
            revocation_endpoint_auth_signing_alg: None,
            id_token_signed_response_alg: default_id_token_alg(),
            id_token_encrypted_response_alg: None,
            id_token_encrypted_response_enc: None,
            userinfo_signed_response_alg: None,
            userinfo_encrypted_response_alg: None,
            userinfo_encrypted_response_enc: None,
            request_object_signing_alg: None,
            request_object_encryption_alg: None,
            request_object_encryption_enc: None,
            default_max_age: None,
            require_auth_time: false,
            tls_client_certificate_bound_access_tokens: false,
            post_logout_redirect_uris: None,
            redirect_uri: None,
            response_type: None,
            other: serde_json::Map::new(),
        }
    }
}

impl ClientMetadata {
    /// A minimal metadata record for the given client identifier.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Enforce invariants and reconcile singular input forms.
    ///
    /// # Errors
    ///
    /// Fails when `client_id` is empty or a singular form conflicts with its
    /// plural counterpart.
    pub(crate) fn normalize(&mut self) -> Result<(), RpError> {
        if self.client_id.is_empty() {
            return Err(RpError::Config("client_id is required".to_string()));
        }

        if let Some(redirect_uri) = self.redirect_uri.take() {
            if self.redirect_uris.is_some() {
                return Err(RpError::Config(
                    "provide a redirect_uri or redirect_uris, not both".to_string(),
                ));
            }
            self.redirect_uris = Some(vec![redirect_uri]);
        }

        if let Some(response_type) = self.response_type.take() {
            if self.response_types != default_response_types() {
                return Err(RpError::Config(
                    "provide a response_type or response_types, not both".to_string(),
                ));
            }
            self.response_types = vec![response_type];
        }

        Ok(())
    }

    /// The effective token endpoint authentication method.
    #[must_use]
    pub fn token_auth_method(&self) -> &str {
        self.token_endpoint_auth_method.as_deref().unwrap_or("client_secret_basic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_forms_normalize() {
        let mut metadata: ClientMetadata = serde_json::from_value(serde_json::json!({
            "client_id": "rp",
            "redirect_uri": "https://rp.example.com/cb",
            "response_type": "code id_token"
        }))
        .expect("should deserialize");
        metadata.normalize().expect("should normalize");

        assert_eq!(metadata.redirect_uris, Some(vec!["https://rp.example.com/cb".to_string()]));
        assert!(metadata.redirect_uri.is_none());
        assert_eq!(metadata.response_types, vec!["code id_token".to_string()]);
    }

    #[test]
    fn both_forms_conflict() {
        let mut metadata: ClientMetadata = serde_json::from_value(serde_json::json!({
            "client_id": "rp",
            "redirect_uri": "https://rp.example.com/cb",
            "redirect_uris": ["https://rp.example.com/other"]
        }))
        .expect("should deserialize");
        assert!(metadata.normalize().is_err());
    }

    #[test]
    fn empty_client_id_rejected() {
        let mut metadata = ClientMetadata::default();
        assert!(metadata.normalize().is_err());
    }

    #[test]
    fn defaults_apply() {
        let metadata = ClientMetadata::new("rp");
        assert_eq!(metadata.response_types, vec!["code".to_string()]);
        assert_eq!(metadata.id_token_signed_response_alg, "RS256");
        assert_eq!(metadata.token_auth_method(), "client_secret_basic");
    }
}
