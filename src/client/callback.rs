//! # Authorization Response Consumption
//!
//! [`Client::callback`] is the OpenID Connect authorization response
//! consumer: it cross-checks the returned parameters against the checks the
//! application stored for the request (`state`, `nonce`, `response_type`,
//! PKCE verifier, `max_age`), surfaces Provider errors, validates any ID
//! Token, and exchanges an authorization code when one is present.
//! [`Client::oauth_callback`] is the plain OAuth 2.0 variant with all ID
//! Token handling removed.

use serde_json::Value;

use super::Client;
use super::auth::AuthenticationExtras;
use super::callback_params::CallbackParams;
use super::validate::{IdTokenChecks, NonceCheck, TokenContext};
use crate::error::{OpError, Result, RpError};
use crate::token_set::TokenSet;

/// Values stored alongside the authorization request, checked against the
/// response.
#[derive(Clone, Debug, Default)]
pub struct CallbackChecks {
    /// Response type the request asked for; artifact presence is enforced
    /// against it.
    pub response_type: Option<String>,

    /// State the request carried.
    pub state: Option<String>,

    /// Nonce the request carried.
    pub nonce: Option<String>,

    /// PKCE code verifier, forwarded to the code exchange.
    pub code_verifier: Option<String>,

    /// Maximum authentication age; inherits the client's
    /// `default_max_age` when unset.
    pub max_age: Option<u64>,
}

/// Optional extensions to the code exchange request.
#[derive(Clone, Debug, Default)]
pub struct CallbackExtras {
    /// Extra body parameters for the token request.
    pub exchange_body: Vec<(String, String)>,

    /// Client assertion overrides.
    pub auth: AuthenticationExtras,
}

impl Client {
    /// Consume an OpenID Connect authorization response.
    ///
    /// # Errors
    ///
    /// Provider errors from the response or exchange, and every local check
    /// described on [`CallbackChecks`].
    pub async fn callback(
        &self, redirect_uri: Option<&str>, params: CallbackParams, mut checks: CallbackChecks,
        extras: CallbackExtras,
    ) -> Result<TokenSet> {
        checks.max_age = checks.max_age.or(self.metadata().default_max_age);
        preflight(&params, &checks)?;

        let decrypted_id_token = match &params.id_token {
            Some(id_token) if !id_token.is_empty() => Some(self.decrypted_id_token(id_token)?),
            _ => None,
        };

        if let Some(id_token) = &decrypted_id_token {
            let id_token_checks = IdTokenChecks {
                nonce: NonceCheck::Expect(checks.nonce.as_deref()),
                max_age: checks.max_age,
                state: checks.state.as_deref(),
                access_token: params.access_token.as_deref(),
                code: params.code.as_deref(),
            };
            self.validate_id_token(id_token, TokenContext::Authorization, &id_token_checks)?;

            if params.code.is_none() {
                let mut tokens = tokens_from_params(&params);
                tokens.id_token = Some(id_token.clone());
                return Ok(tokens);
            }
        }

        if let Some(code) = &params.code {
            let mut body = vec![
                ("grant_type".to_string(), "authorization_code".to_string()),
                ("code".to_string(), code.clone()),
            ];
            if let Some(redirect_uri) = redirect_uri {
                body.push(("redirect_uri".to_string(), redirect_uri.to_string()));
            }
            if let Some(code_verifier) = &checks.code_verifier {
                body.push(("code_verifier".to_string(), code_verifier.clone()));
            }
            body.extend(extras.exchange_body.iter().cloned());

            let mut tokens = self
                .token_request(body, extras.auth.client_assertion_payload.as_ref())
                .await?;

            if let Some(id_token) = tokens.id_token.clone() {
                let id_token = self.decrypted_id_token(&id_token)?;
                let id_token_checks = IdTokenChecks {
                    nonce: NonceCheck::Expect(checks.nonce.as_deref()),
                    max_age: checks.max_age,
                    // s_hash is an authorization-response concern
                    state: None,
                    access_token: tokens.access_token.as_deref(),
                    code: params.code.as_deref(),
                };
                self.validate_id_token(&id_token, TokenContext::Token, &id_token_checks)?;
                tokens.id_token = Some(id_token);
            }

            if tokens.session_state.is_none() {
                tokens.session_state = params.session_state.clone();
            }
            return Ok(tokens);
        }

        let mut tokens = tokens_from_params(&params);
        if let Some(id_token) = decrypted_id_token {
            tokens.id_token = Some(id_token);
        }
        Ok(tokens)
    }

    /// Consume a plain OAuth 2.0 authorization response.
    ///
    /// `response_type=id_token` is not supported here; any `id_token` in
    /// the response or the exchange is an error directing the caller to
    /// [`Self::callback`].
    ///
    /// # Errors
    ///
    /// Provider errors from the response or exchange, and the local checks
    /// described on [`CallbackChecks`].
    pub async fn oauth_callback(
        &self, redirect_uri: Option<&str>, params: CallbackParams, checks: CallbackChecks,
        extras: CallbackExtras,
    ) -> Result<TokenSet> {
        if checks
            .response_type
            .as_deref()
            .is_some_and(|rt| rt.split(' ').any(|part| part == "id_token"))
        {
            return Err(RpError::Usage(
                "response_type id_token is not supported, use callback() instead",
            )
            .into());
        }
        preflight(&params, &checks)?;

        if params.id_token.as_deref().is_some_and(|id_token| !id_token.is_empty()) {
            return Err(RpError::UnexpectedIdToken.into());
        }

        if let Some(code) = &params.code {
            let mut body = vec![
                ("grant_type".to_string(), "authorization_code".to_string()),
                ("code".to_string(), code.clone()),
            ];
            if let Some(redirect_uri) = redirect_uri {
                body.push(("redirect_uri".to_string(), redirect_uri.to_string()));
            }
            if let Some(code_verifier) = &checks.code_verifier {
                body.push(("code_verifier".to_string(), code_verifier.clone()));
            }
            body.extend(extras.exchange_body.iter().cloned());

            let tokens = self
                .token_request(body, extras.auth.client_assertion_payload.as_ref())
                .await?;
            if tokens.id_token.is_some() {
                return Err(RpError::UnexpectedIdToken.into());
            }
            return Ok(tokens);
        }

        Ok(tokens_from_params(&params))
    }
}

/// Checks shared by both callback variants: state, Provider errors, and
/// response-type implied artifacts.
fn preflight(params: &CallbackParams, checks: &CallbackChecks) -> Result<()> {
    match (&checks.state, &params.state) {
        (None, Some(_)) => {
            return Err(RpError::Usage("checks.state argument is missing").into());
        }
        (Some(_), None) => {
            return Err(RpError::MissingParam("state").into());
        }
        (Some(expected), Some(got)) if expected != got => {
            return Err(RpError::StateMismatch {
                expected: expected.clone(),
                got: got.clone(),
            }
            .into());
        }
        _ => {}
    }

    if let Some(error) = &params.error {
        return Err(OpError {
            error: error.clone(),
            error_description: params.error_description.clone(),
            error_uri: params.error_uri.clone(),
            state: params.state.clone(),
            session_state: params.session_state.clone(),
            ..OpError::default()
        }
        .into());
    }

    if let Some(response_type) = &checks.response_type {
        for part in response_type.split(' ') {
            match part {
                "code" => {
                    if params.code.is_none() {
                        return Err(RpError::MissingParam("code").into());
                    }
                }
                "id_token" => {
                    if params.id_token.is_none() {
                        return Err(RpError::MissingParam("id_token").into());
                    }
                }
                "token" => {
                    if params.access_token.is_none() {
                        return Err(RpError::MissingParam("access_token").into());
                    }
                    if params.token_type.is_none() {
                        return Err(RpError::MissingParam("token_type").into());
                    }
                }
                "none" => {
                    if params.code.is_some()
                        || params.id_token.is_some()
                        || params.access_token.is_some()
                    {
                        return Err(RpError::UnexpectedParams.into());
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Assemble a token set out of authorization response parameters.
fn tokens_from_params(params: &CallbackParams) -> TokenSet {
    let mut tokens = TokenSet {
        access_token: params.access_token.clone(),
        token_type: params.token_type.clone(),
        id_token: params.id_token.clone(),
        refresh_token: params.refresh_token.clone(),
        scope: params.scope.clone(),
        session_state: params.session_state.clone(),
        ..TokenSet::default()
    };
    if let Some(code) = &params.code {
        tokens.other.insert("code".to_string(), Value::String(code.clone()));
    }
    if let Some(expires_in) = params.expires_in.as_deref().and_then(|v| v.parse::<i64>().ok()) {
        tokens.set_expires_in(expires_in);
    }
    tokens
}
