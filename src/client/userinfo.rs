//! # Userinfo
//!
//! Fetches the userinfo endpoint with the access token carried in the
//! `Authorization` header (default), the query string (`GET` only), or the
//! form body (`POST` only). When the client registered a signed or
//! encrypted userinfo response, `application/jwt` is negotiated and the
//! response validated like an ID Token in the userinfo context. When the
//! caller supplies a full token set, the response `sub` is cross-checked
//! against the ID Token's.

use serde_json::{Map, Value};

use super::Client;
use super::validate::{EncryptedResponse, IdTokenChecks, NonceCheck, TokenContext};
use crate::error::{Result, RpError};
use crate::http::{self, Expect};
use crate::token_set::TokenSet;

/// The access token input to [`Client::userinfo`].
#[derive(Clone, Copy, Debug)]
pub enum UserinfoToken<'a> {
    /// A bare access token; the `sub` cross-check does not apply.
    AccessToken(&'a str),

    /// A token set; its `id_token`, when present, pins the expected `sub`.
    Tokens(&'a TokenSet),
}

impl<'a> From<&'a str> for UserinfoToken<'a> {
    fn from(token: &'a str) -> Self {
        Self::AccessToken(token)
    }
}

impl<'a> From<&'a TokenSet> for UserinfoToken<'a> {
    fn from(tokens: &'a TokenSet) -> Self {
        Self::Tokens(tokens)
    }
}

/// How the access token and extra parameters ride on the request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserinfoVia {
    /// `Authorization: Bearer` header.
    #[default]
    Header,

    /// Query parameter, `GET` only.
    Query,

    /// Form body parameter, `POST` only.
    Body,
}

/// Options for a userinfo request.
#[derive(Clone, Debug, Default)]
pub struct UserinfoOptions {
    /// Use `POST` instead of `GET`.
    pub post: bool,

    /// Where the access token rides.
    pub via: UserinfoVia,

    /// Extra parameters to send along.
    pub params: Vec<(String, String)>,
}

impl Client {
    /// Fetch the userinfo endpoint.
    ///
    /// # Errors
    ///
    /// Provider errors, transport failures, response validation failures,
    /// and the `sub` cross-check.
    pub async fn userinfo(
        &self, token: UserinfoToken<'_>, options: UserinfoOptions,
    ) -> Result<Map<String, Value>> {
        let access_token = match token {
            UserinfoToken::AccessToken(token) => token,
            UserinfoToken::Tokens(tokens) => tokens
                .access_token
                .as_deref()
                .ok_or(RpError::Usage("access_token not present in TokenSet"))?,
        };

        let metadata = self.metadata();
        let endpoint = self
            .issuer()
            .userinfo_endpoint
            .clone()
            .ok_or(RpError::MissingEndpoint("userinfo_endpoint"))?;

        // certificate-bound access tokens must hit the mTLS alias
        let mtls = metadata.tls_client_certificate_bound_access_tokens;
        let endpoint = if mtls {
            self.issuer()
                .mtls_endpoint_aliases
                .as_ref()
                .and_then(|aliases| aliases.userinfo_endpoint.clone())
                .unwrap_or(endpoint)
        } else {
            endpoint
        };

        let jwt_response = metadata.userinfo_signed_response_alg.is_some()
            || metadata.userinfo_encrypted_response_alg.is_some();
        let accept = if jwt_response { "application/jwt" } else { "application/json" };

        let http_client = self.http_for(mtls);
        let mut params = options.params.clone();

        let request = match (options.post, options.via) {
            (false, UserinfoVia::Header) => {
                let mut request = http_client.get(&endpoint);
                for (name, value) in &params {
                    request = request.query(&[(name, value)]);
                }
                let (header, value) = http::bearer(access_token);
                request.header(header, value)
            }
            (false, UserinfoVia::Query) => {
                let mut request =
                    http_client.get(&endpoint).query(&[("access_token", access_token)]);
                for (name, value) in &params {
                    request = request.query(&[(name, value)]);
                }
                request
            }
            (false, UserinfoVia::Body) => {
                return Err(RpError::Usage(
                    "can only send body parameters when POSTing to the userinfo endpoint",
                )
                .into());
            }
            (true, UserinfoVia::Header) => {
                let body = serde_urlencoded::to_string(&params).unwrap_or_default();
                let (header, value) = http::bearer(access_token);
                http_client
                    .post(&endpoint)
                    .header(http::CONTENT_TYPE_HEADER, "application/x-www-form-urlencoded")
                    .body(body)
                    .header(header, value)
            }
            (true, UserinfoVia::Body) => {
                params.push(("access_token".to_string(), access_token.to_string()));
                let body = serde_urlencoded::to_string(&params).unwrap_or_default();
                http_client
                    .post(&endpoint)
                    .header(http::CONTENT_TYPE_HEADER, "application/x-www-form-urlencoded")
                    .body(body)
            }
            (true, UserinfoVia::Query) => {
                return Err(RpError::Usage(
                    "access tokens in the query are only sent with GET requests",
                )
                .into());
            }
        };
        let request = request.header(http::ACCEPT_HEADER, accept);

        let response = http::dispatch(request, Expect::Success).await?;

        let claims = if jwt_response {
            if !response
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("application/jwt"))
            {
                return Err(RpError::ExpectedJwtResponse.into());
            }
            let body = String::from_utf8_lossy(&response.body).trim().to_string();

            let signed = if metadata.userinfo_encrypted_response_alg.is_some() {
                let plaintext = self.decrypt_response(EncryptedResponse::Userinfo, &body)?;
                String::from_utf8(plaintext).map_err(|_| {
                    RpError::Jwt("decrypted JWE payload is not valid UTF-8".to_string())
                })?
            } else {
                body
            };

            if metadata.userinfo_signed_response_alg.is_some() {
                self.validate_id_token(
                    &signed,
                    TokenContext::Userinfo,
                    &IdTokenChecks {
                        nonce: NonceCheck::Skip,
                        ..IdTokenChecks::default()
                    },
                )?
            } else {
                // encrypted-only registration: the plaintext is plain JSON
                serde_json::from_str(&signed).map_err(|e| {
                    RpError::Jwt(format!("failed to parse userinfo JWE payload as JSON: {e}"))
                })?
            }
        } else {
            response.json()?
        };

        if let UserinfoToken::Tokens(tokens) = token {
            if tokens.id_token.is_some() {
                let expected = tokens
                    .claims()?
                    .get("sub")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let got = claims.get("sub").and_then(Value::as_str).unwrap_or_default();
                if got != expected {
                    return Err(RpError::UserinfoSubMismatch {
                        expected,
                        got: got.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(claims)
    }
}
