//! # Token Endpoint Family
//!
//! The authenticated POSTs sent to the token, revocation, introspection,
//! and device authorization endpoints. Every operation routes through one
//! authenticated form POST so the client authentication and mTLS handling
//! live in a single place.

use reqwest::StatusCode;
use serde_json::{Map, Value};

use super::Client;
use super::auth::{AuthEndpoint, AuthenticationExtras};
use super::validate::{IdTokenChecks, NonceCheck, TokenContext};
use crate::device::{DeviceAuthorizationResponse, DeviceFlowHandle};
use crate::error::{Result, RpError};
use crate::http::{self, Expect};
use crate::token_set::TokenSet;

/// Input to [`Client::refresh`]: a bare refresh token or the token set it
/// came in, which also enables the `sub` continuity check.
#[derive(Clone, Debug)]
pub enum RefreshInput {
    /// A refresh token value.
    Token(String),

    /// A previously returned token set.
    Tokens(Box<TokenSet>),
}

impl From<String> for RefreshInput {
    fn from(token: String) -> Self {
        Self::Token(token)
    }
}

impl From<&str> for RefreshInput {
    fn from(token: &str) -> Self {
        Self::Token(token.to_string())
    }
}

impl From<TokenSet> for RefreshInput {
    fn from(tokens: TokenSet) -> Self {
        Self::Tokens(Box::new(tokens))
    }
}

impl Client {
    /// Perform an arbitrary authenticated grant at the token endpoint.
    ///
    /// # Errors
    ///
    /// Provider errors, transport failures, and configuration problems.
    pub async fn grant(
        &self, body: Vec<(String, String)>, extras: &AuthenticationExtras,
    ) -> Result<TokenSet> {
        self.token_request(body, extras.client_assertion_payload.as_ref()).await
    }

    /// Exchange a refresh token, validating any returned ID Token.
    ///
    /// When a [`TokenSet`] is supplied and both the old and new responses
    /// carry ID Tokens, the `sub` must not change.
    ///
    /// # Errors
    ///
    /// Provider errors, transport failures, and validation failures.
    pub async fn refresh(
        &self, input: impl Into<RefreshInput>, extras: &AuthenticationExtras,
    ) -> Result<TokenSet> {
        let input = input.into();
        let (refresh_token, expected_sub) = match &input {
            RefreshInput::Token(token) => (token.clone(), None),
            RefreshInput::Tokens(tokens) => {
                let token = tokens.refresh_token.clone().ok_or(RpError::Usage(
                    "refresh_token not present in TokenSet",
                ))?;
                let sub = tokens
                    .claims()
                    .ok()
                    .and_then(|claims| claims.get("sub").and_then(Value::as_str).map(String::from));
                (token, sub)
            }
        };

        let body = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token),
        ];
        let tokens =
            self.token_request(body, extras.client_assertion_payload.as_ref()).await?;

        if let Some(id_token) = tokens.id_token.clone() {
            let id_token = self.decrypted_id_token(&id_token)?;
            let checks = IdTokenChecks {
                nonce: NonceCheck::Skip,
                access_token: tokens.access_token.as_deref(),
                ..IdTokenChecks::default()
            };
            let payload = self.validate_id_token(&id_token, TokenContext::Token, &checks)?;

            if let Some(expected) = expected_sub {
                let got = payload.get("sub").and_then(Value::as_str).unwrap_or_default();
                if got != expected {
                    return Err(RpError::SubMismatch {
                        expected,
                        got: got.to_string(),
                    }
                    .into());
                }
            }
            let mut tokens = tokens;
            tokens.id_token = Some(id_token);
            return Ok(tokens);
        }
        Ok(tokens)
    }

    /// Revoke a token, RFC 7009. Any 2xx response concludes the call; the
    /// body is ignored.
    ///
    /// # Errors
    ///
    /// Provider errors and transport failures.
    pub async fn revoke(
        &self, token: &str, token_type_hint: Option<&str>, extras: &AuthenticationExtras,
    ) -> Result<()> {
        let endpoint = self
            .issuer()
            .revocation_endpoint
            .clone()
            .ok_or(RpError::MissingEndpoint("revocation_endpoint"))?;

        let mut form = vec![("token".to_string(), token.to_string())];
        if let Some(hint) = token_type_hint {
            form.push(("token_type_hint".to_string(), hint.to_string()));
        }

        self.authenticated_post(
            AuthEndpoint::Revocation,
            &endpoint,
            form,
            extras.client_assertion_payload.as_ref(),
            Expect::Success,
        )
        .await
        .map(|_| ())
    }

    /// Introspect a token, RFC 7662, returning the Provider's response
    /// body.
    ///
    /// # Errors
    ///
    /// Provider errors and transport failures.
    pub async fn introspect(
        &self, token: &str, token_type_hint: Option<&str>, extras: &AuthenticationExtras,
    ) -> Result<Map<String, Value>> {
        let endpoint = self
            .issuer()
            .introspection_endpoint
            .clone()
            .ok_or(RpError::MissingEndpoint("introspection_endpoint"))?;

        let mut form = vec![("token".to_string(), token.to_string())];
        if let Some(hint) = token_type_hint {
            form.push(("token_type_hint".to_string(), hint.to_string()));
        }

        let response = self
            .authenticated_post(
                AuthEndpoint::Introspection,
                &endpoint,
                form,
                extras.client_assertion_payload.as_ref(),
                Expect::Status(StatusCode::OK),
            )
            .await?;
        response.json()
    }

    /// Start a device authorization grant, RFC 8628.
    ///
    /// The request is authenticated with the **token** endpoint's method.
    /// `params` extends the default `client_id` + `scope=openid` body;
    /// a `max_age` member is kept for validating the eventual ID Token.
    ///
    /// # Errors
    ///
    /// Provider errors, transport failures, and configuration problems.
    pub async fn device_authorization(
        &self, params: Map<String, Value>, extras: &AuthenticationExtras,
    ) -> Result<DeviceFlowHandle<'_>> {
        let endpoint = self
            .issuer()
            .device_authorization_endpoint
            .clone()
            .ok_or(RpError::MissingEndpoint("device_authorization_endpoint"))?;

        let max_age = params.get("max_age").and_then(Value::as_u64);

        let mut form = vec![
            ("client_id".to_string(), self.metadata().client_id.clone()),
            ("scope".to_string(), "openid".to_string()),
        ];
        for (name, value) in &params {
            if name == "max_age" {
                continue;
            }
            let Some(value) = coerce(value) else { continue };
            form.retain(|(existing, _)| existing != name);
            form.push((name.clone(), value));
        }

        let response = self
            .authenticated_post(
                AuthEndpoint::Token,
                &endpoint,
                form,
                extras.client_assertion_payload.as_ref(),
                Expect::Status(StatusCode::OK),
            )
            .await?;
        let authorization: DeviceAuthorizationResponse = response.json()?;

        Ok(DeviceFlowHandle::new(
            self,
            authorization,
            max_age,
            Vec::new(),
            extras.client_assertion_payload.clone(),
        ))
    }

    /// One device-flow poll: exchange the device code and validate any ID
    /// Token with the token context.
    pub(crate) async fn device_token_exchange(
        &self, body: Vec<(String, String)>, max_age: Option<u64>,
        assertion_payload: Option<&Map<String, Value>>,
    ) -> Result<TokenSet> {
        let mut tokens = self.token_request(body, assertion_payload).await?;

        if let Some(id_token) = tokens.id_token.clone() {
            let id_token = self.decrypted_id_token(&id_token)?;
            let checks = IdTokenChecks {
                nonce: NonceCheck::Skip,
                max_age,
                access_token: tokens.access_token.as_deref(),
                ..IdTokenChecks::default()
            };
            self.validate_id_token(&id_token, TokenContext::Token, &checks)?;
            tokens.id_token = Some(id_token);
        }
        Ok(tokens)
    }

    /// The authenticated token-endpoint POST shared by every grant.
    pub(crate) async fn token_request(
        &self, body: Vec<(String, String)>, assertion_payload: Option<&Map<String, Value>>,
    ) -> Result<TokenSet> {
        let endpoint = self
            .issuer()
            .token_endpoint
            .clone()
            .ok_or(RpError::MissingEndpoint("token_endpoint"))?;

        let response = self
            .authenticated_post(
                AuthEndpoint::Token,
                &endpoint,
                body,
                assertion_payload,
                Expect::Status(StatusCode::OK),
            )
            .await?;
        let mut tokens: TokenSet = response.json()?;
        tokens.normalize();
        Ok(tokens)
    }

    async fn authenticated_post(
        &self, auth_endpoint: AuthEndpoint, endpoint: &str, mut form: Vec<(String, String)>,
        assertion_payload: Option<&Map<String, Value>>, expected: Expect,
    ) -> Result<crate::http::RawResponse> {
        let auth = self.auth_for(auth_endpoint, endpoint, assertion_payload)?;

        for (name, value) in auth.form {
            form.retain(|(existing, _)| *existing != name);
            form.push((name, value));
        }

        let url = if auth.mtls {
            self.mtls_alias(auth_endpoint, endpoint)
        } else {
            endpoint.to_string()
        };

        let mut request =
            http::form_post(self.http_for(auth.mtls), &url, "application/json", &form);
        if let Some(basic) = auth.basic {
            request = request.header(http::AUTHORIZATION_HEADER, basic);
        }
        http::dispatch(request, expected).await
    }

    /// The mTLS alias for an endpoint, when the issuer advertises one.
    fn mtls_alias(&self, auth_endpoint: AuthEndpoint, endpoint: &str) -> String {
        let aliases = self.issuer().mtls_endpoint_aliases.as_ref();
        let alias = aliases.and_then(|aliases| match auth_endpoint {
            AuthEndpoint::Token => aliases.token_endpoint.clone(),
            AuthEndpoint::Introspection => aliases.introspection_endpoint.clone(),
            AuthEndpoint::Revocation => aliases.revocation_endpoint.clone(),
        });
        alias.unwrap_or_else(|| endpoint.to_string())
    }
}

/// Coerce a JSON parameter to its wire string; `Null` drops the parameter.
fn coerce(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}
