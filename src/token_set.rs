//! # Token Set
//!
//! The container for whatever the token endpoint returned. Known members get
//! typed accessors; everything else is preserved in an open map so
//! Provider-specific fields survive round trips. A relative `expires_in` is
//! converted to the absolute `expires_at` at construction.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RpError;

/// Tokens and companion values returned by the token endpoint or assembled
/// from an authorization response.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TokenSet {
    /// OAuth 2.0 access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Type of the access token, typically `Bearer`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// OpenID Connect ID Token, compact JWS (decrypted form when the
    /// response was encrypted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// OAuth 2.0 refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Session state for OpenID Connect Session Management.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,

    /// Remaining token lifetime in seconds, as returned by the Provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Absolute expiry as a UNIX timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Any further members of the token response.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl TokenSet {
    /// Normalize a freshly-parsed token response: a relative `expires_in`
    /// becomes an absolute `expires_at` anchored at `now`.
    pub(crate) fn normalize(&mut self) {
        if self.expires_at.is_none() {
            if let Some(expires_in) = self.expires_in {
                self.expires_at = Some(Utc::now().timestamp() + expires_in);
            }
        }
        self.expires_in = None;
    }

    /// Anchor a relative lifetime, e.g. from authorization response
    /// parameters.
    pub(crate) fn set_expires_in(&mut self, seconds: i64) {
        self.expires_at = Some(Utc::now().timestamp() + seconds);
        self.expires_in = None;
    }

    /// Absolute expiry of the access token, when known.
    #[must_use]
    pub const fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    /// Remaining access token lifetime in seconds, clamped at zero.
    #[must_use]
    pub fn expires_in(&self) -> Option<i64> {
        self.expires_at.map(|at| (at - Utc::now().timestamp()).max(0))
    }

    /// `true` when the access token lifetime has elapsed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expires_in().is_some_and(|remaining| remaining == 0)
    }

    /// Decode the ID Token payload without verifying it.
    ///
    /// Validation happens when the set is produced by [`crate::Client`]
    /// flows; this accessor is for reading claims afterwards.
    ///
    /// # Errors
    ///
    /// Fails when no `id_token` is present or its payload segment is not a
    /// JSON object.
    pub fn claims(&self) -> Result<Map<String, Value>, RpError> {
        let id_token = self.id_token.as_deref().ok_or(RpError::MissingIdToken)?;

        let mut segments = id_token.split('.');
        let payload = segments
            .nth(1)
            .ok_or_else(|| RpError::Jwt("JWT is not a valid compact serialization".to_string()))?;
        let decoded = Base64UrlUnpadded::decode_vec(payload)
            .map_err(|_| RpError::Jwt("JWT segment is not valid base64url".to_string()))?;
        serde_json::from_slice(&decoded)
            .map_err(|e| RpError::Jwt(format!("failed to parse JWT payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_in_becomes_absolute() {
        let mut tokens: TokenSet = serde_json::from_value(serde_json::json!({
            "access_token": "A",
            "token_type": "Bearer",
            "expires_in": 300
        }))
        .expect("should deserialize");
        tokens.normalize();

        let expires_at = tokens.expires_at().expect("absolute expiry set");
        assert!(expires_at > Utc::now().timestamp());
        assert!(!tokens.expired());
    }

    #[test]
    fn provider_fields_survive() {
        let tokens: TokenSet = serde_json::from_value(serde_json::json!({
            "access_token": "A",
            "foo": "bar"
        }))
        .expect("should deserialize");
        assert_eq!(tokens.other.get("foo"), Some(&Value::String("bar".to_string())));
    }

    #[test]
    fn claims_reads_the_payload() {
        let payload = Base64UrlUnpadded::encode_string(br#"{"sub":"u","nonce":"n"}"#);
        let tokens = TokenSet {
            id_token: Some(format!("e30.{payload}.sig")),
            ..TokenSet::default()
        };
        let claims = tokens.claims().expect("should decode");
        assert_eq!(claims.get("sub"), Some(&Value::String("u".to_string())));
    }

    #[test]
    fn claims_without_id_token() {
        let tokens = TokenSet::default();
        assert!(matches!(tokens.claims(), Err(RpError::MissingIdToken)));
    }
}
