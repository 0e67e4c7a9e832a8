//! # Authorization Request Parameters
//!
//! Building the authorization URL, its self-submitting form variant, and the
//! RP-initiated logout URL. Caller-supplied parameters are merged with
//! client defaults, `null`-like values dropped, the `claims` object
//! JSON-encoded, and `resource` kept as a multi-value parameter. Query
//! strings already present on the discovered endpoints are preserved.

use std::collections::HashSet;

use serde_json::Value;
use url::Url;

use super::Client;
use crate::error::{Result, RpError};
use crate::token_set::TokenSet;

/// Parameters of an authorization request.
///
/// Unset members fall back to client metadata where a default exists;
/// anything not covered by a named field goes in `other`.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationParameters {
    /// Requested scope. Defaults to `openid`.
    pub scope: Option<String>,

    /// Response type. Resolved from metadata when exactly one is registered.
    pub response_type: Option<String>,

    /// Redirect URI. Resolved from metadata when exactly one is registered.
    pub redirect_uri: Option<String>,

    /// Opaque state echoed back on the callback.
    pub state: Option<String>,

    /// Binds the ID Token to this authentication. Required whenever the
    /// response type includes `id_token`.
    pub nonce: Option<String>,

    /// Requested claims, JSON-encoded on the wire when given as an object.
    pub claims: Option<Value>,

    /// Maximum authentication age in seconds.
    pub max_age: Option<u64>,

    /// Requested display mode.
    pub display: Option<String>,

    /// Requested prompt.
    pub prompt: Option<String>,

    /// Login hint forwarded to the Provider.
    pub login_hint: Option<String>,

    /// ID Token hint forwarded to the Provider.
    pub id_token_hint: Option<String>,

    /// Requested Authentication Context Class References.
    pub acr_values: Option<String>,

    /// PKCE code challenge.
    pub code_challenge: Option<String>,

    /// PKCE code challenge method, typically `S256`.
    pub code_challenge_method: Option<String>,

    /// Response mode, e.g. `form_post`.
    pub response_mode: Option<String>,

    /// Request object JWT, passed by value.
    pub request: Option<String>,

    /// Request object reference.
    pub request_uri: Option<String>,

    /// RFC 8707 resource indicators; each value becomes its own `resource`
    /// parameter.
    pub resource: Vec<String>,

    /// Any further parameters. `Null` values are dropped, strings pass
    /// through, and other JSON values are coerced to strings.
    pub other: serde_json::Map<String, Value>,
}

/// Parameters of an RP-initiated logout request.
#[derive(Clone, Debug, Default)]
pub struct EndSessionParameters {
    /// Previously issued ID Token, raw or still inside its token set.
    pub id_token_hint: Option<IdTokenHint>,

    /// Where the Provider redirects after logout. Defaults to the single
    /// registered value when exactly one is listed.
    pub post_logout_redirect_uri: Option<String>,

    /// Opaque state echoed back after logout.
    pub state: Option<String>,

    /// Any further parameters.
    pub other: serde_json::Map<String, Value>,
}

/// An ID Token hint, accepted raw or extracted from a [`TokenSet`].
#[derive(Clone, Debug)]
pub enum IdTokenHint {
    /// A compact JWT.
    Jwt(String),

    /// A token set whose `id_token` is used.
    Tokens(Box<TokenSet>),
}

impl From<String> for IdTokenHint {
    fn from(jwt: String) -> Self {
        Self::Jwt(jwt)
    }
}

impl From<TokenSet> for IdTokenHint {
    fn from(tokens: TokenSet) -> Self {
        Self::Tokens(Box::new(tokens))
    }
}

impl Client {
    /// Build the authorization request URL.
    ///
    /// # Errors
    ///
    /// Fails when the issuer has no authorization endpoint, a default cannot
    /// be resolved, or `nonce` is absent for a response type containing
    /// `id_token`.
    pub fn authorization_url(&self, params: AuthorizationParameters) -> Result<Url> {
        let endpoint = self
            .issuer()
            .authorization_endpoint
            .as_deref()
            .ok_or(RpError::MissingEndpoint("authorization_endpoint"))?;
        let mut url = Url::parse(endpoint)
            .map_err(|e| RpError::Config(format!("invalid authorization_endpoint: {e}")))?;

        let pairs = self.authorization_params(params)?;

        // preserve the endpoint's own query, minus keys the request now sets
        let overridden: HashSet<&str> = pairs.iter().map(|(name, _)| name.as_str()).collect();
        let existing: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| !overridden.contains(name.as_ref()))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in existing.iter().chain(&pairs) {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Build the self-submitting HTML form variant of the authorization
    /// request.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::authorization_url`].
    pub fn authorization_post(&self, params: AuthorizationParameters) -> Result<String> {
        let endpoint = self
            .issuer()
            .authorization_endpoint
            .as_deref()
            .ok_or(RpError::MissingEndpoint("authorization_endpoint"))?;

        let inputs = self
            .authorization_params(params)?
            .iter()
            .map(|(name, value)| {
                format!(
                    "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>",
                    escape_html(name),
                    escape_html(value)
                )
            })
            .collect::<Vec<_>>()
            .join("\n        ");

        Ok(format!(
            r#"<!DOCTYPE html>
<head>
  <title>Requesting Authorization</title>
</head>
<body onload="javascript:document.forms[0].submit()">
  <form method="post" action="{}">
    {inputs}
  </form>
</body>
</html>"#,
            escape_html(endpoint)
        ))
    }

    /// Build the RP-initiated logout URL.
    ///
    /// # Errors
    ///
    /// Fails when the issuer has no end session endpoint or a token set hint
    /// carries no `id_token`.
    pub fn end_session_url(&self, params: EndSessionParameters) -> Result<Url> {
        let endpoint = self
            .issuer()
            .end_session_endpoint
            .as_deref()
            .ok_or(RpError::MissingEndpoint("end_session_endpoint"))?;
        let mut url = Url::parse(endpoint)
            .map_err(|e| RpError::Config(format!("invalid end_session_endpoint: {e}")))?;

        let id_token_hint = match params.id_token_hint {
            Some(IdTokenHint::Jwt(jwt)) => Some(jwt),
            Some(IdTokenHint::Tokens(tokens)) => {
                Some(tokens.id_token.clone().ok_or(RpError::MissingIdToken)?)
            }
            None => None,
        };

        let post_logout_redirect_uri = params.post_logout_redirect_uri.or_else(|| {
            match self.metadata().post_logout_redirect_uris.as_deref() {
                Some([single]) => Some(single.clone()),
                _ => None,
            }
        });

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.metadata().client_id);
            if let Some(hint) = &id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
            if let Some(uri) = &post_logout_redirect_uri {
                query.append_pair("post_logout_redirect_uri", uri);
            }
            if let Some(state) = &params.state {
                query.append_pair("state", state);
            }
            for (name, value) in &params.other {
                if let Some(value) = coerce(value) {
                    query.append_pair(name, &value);
                }
            }
        }
        Ok(url)
    }

    /// Normalize caller parameters into the wire pairs of an authorization
    /// request, applying client defaults.
    pub(crate) fn authorization_params(
        &self, params: AuthorizationParameters,
    ) -> Result<Vec<(String, String)>, RpError> {
        let metadata = self.metadata();

        let response_type = match params.response_type {
            Some(response_type) => Some(response_type),
            None => match metadata.response_types.as_slice() {
                [single] => Some(single.clone()),
                _ => None,
            },
        };
        let redirect_uri = match params.redirect_uri {
            Some(redirect_uri) => Some(redirect_uri),
            None => match metadata.redirect_uris.as_deref() {
                Some([single]) => Some(single.clone()),
                _ => None,
            },
        };

        if let Some(response_type) = &response_type {
            if response_type.split(' ').any(|rt| rt == "id_token") && params.nonce.is_none() {
                return Err(RpError::Usage(
                    "nonce MUST be provided for implicit and hybrid flows",
                ));
            }
        }

        let mut pairs = vec![(
            "client_id".to_string(),
            metadata.client_id.clone(),
        )];
        pairs.push((
            "scope".to_string(),
            params.scope.unwrap_or_else(|| "openid".to_string()),
        ));

        let named = [
            ("response_type", response_type),
            ("redirect_uri", redirect_uri),
            ("state", params.state),
            ("nonce", params.nonce),
            ("display", params.display),
            ("prompt", params.prompt),
            ("login_hint", params.login_hint),
            ("id_token_hint", params.id_token_hint),
            ("acr_values", params.acr_values),
            ("code_challenge", params.code_challenge),
            ("code_challenge_method", params.code_challenge_method),
            ("response_mode", params.response_mode),
            ("request", params.request),
            ("request_uri", params.request_uri),
            ("max_age", params.max_age.map(|age| age.to_string())),
        ];
        for (name, value) in named {
            if let Some(value) = value {
                pairs.push((name.to_string(), value));
            }
        }

        if let Some(claims) = params.claims {
            let encoded = match claims {
                Value::String(s) => s,
                Value::Null => String::new(),
                object => serde_json::to_string(&object)
                    .map_err(|e| RpError::Config(format!("failed to serialize claims: {e}")))?,
            };
            if !encoded.is_empty() {
                pairs.push(("claims".to_string(), encoded));
            }
        }

        // resource is a multi-valued parameter, RFC 8707
        for resource in params.resource {
            pairs.push(("resource".to_string(), resource));
        }

        for (name, value) in params.other {
            if let Some(value) = coerce(&value) {
                pairs.push((name, value));
            }
        }

        Ok(pairs)
    }
}

/// Coerce a JSON parameter value to its wire string; `Null` drops the
/// parameter.
fn coerce(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientMetadata;
    use crate::issuer::Issuer;

    fn client() -> Client {
        let issuer = Issuer {
            issuer: "https://op.example.com".to_string(),
            authorization_endpoint: Some("https://op.example.com/auth?audience=api".to_string()),
            end_session_endpoint: Some("https://op.example.com/session/end".to_string()),
            ..Issuer::default()
        };
        let metadata = ClientMetadata {
            redirect_uris: Some(vec!["https://rp.example.com/cb".to_string()]),
            post_logout_redirect_uris: Some(vec!["https://rp.example.com/".to_string()]),
            ..ClientMetadata::new("rp")
        };
        Client::new(issuer, metadata).expect("should construct")
    }

    fn query_pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
    }

    #[test]
    fn defaults_resolve_from_metadata() {
        let url = client()
            .authorization_url(AuthorizationParameters::default())
            .expect("should build");
        let pairs = query_pairs(&url);

        assert!(pairs.contains(&("client_id".to_string(), "rp".to_string())));
        assert!(pairs.contains(&("scope".to_string(), "openid".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(
            pairs.contains(&("redirect_uri".to_string(), "https://rp.example.com/cb".to_string()))
        );
        // the endpoint's own query survives
        assert!(pairs.contains(&("audience".to_string(), "api".to_string())));
    }

    #[test]
    fn id_token_response_type_requires_nonce() {
        let params = AuthorizationParameters {
            response_type: Some("code id_token".to_string()),
            ..AuthorizationParameters::default()
        };
        assert!(matches!(
            client().authorization_url(params),
            Err(crate::Error::Rp(RpError::Usage(_)))
        ));

        let params = AuthorizationParameters {
            response_type: Some("code id_token".to_string()),
            nonce: Some("n-0S6_WzA2Mj".to_string()),
            ..AuthorizationParameters::default()
        };
        client().authorization_url(params).expect("should build");
    }

    #[test]
    fn claims_object_is_json_encoded() {
        let params = AuthorizationParameters {
            claims: Some(serde_json::json!({"userinfo": {"email": null}})),
            ..AuthorizationParameters::default()
        };
        let url = client().authorization_url(params).expect("should build");
        let pairs = query_pairs(&url);
        let claims = pairs.iter().find(|(k, _)| k == "claims").expect("claims present");
        assert_eq!(claims.1, r#"{"userinfo":{"email":null}}"#);
    }

    #[test]
    fn resource_is_multi_valued() {
        let params = AuthorizationParameters {
            resource: vec![
                "https://api.example.com".to_string(),
                "https://files.example.com".to_string(),
            ],
            ..AuthorizationParameters::default()
        };
        let url = client().authorization_url(params).expect("should build");
        let resources: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "resource")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(resources.len(), 2);
    }

    #[test]
    fn null_values_are_dropped() {
        let mut other = serde_json::Map::new();
        other.insert("ui_locales".to_string(), Value::Null);
        other.insert("foo".to_string(), Value::from(42));
        let params = AuthorizationParameters {
            other,
            ..AuthorizationParameters::default()
        };
        let url = client().authorization_url(params).expect("should build");
        let pairs = query_pairs(&url);
        assert!(!pairs.iter().any(|(k, _)| k == "ui_locales"));
        assert!(pairs.contains(&("foo".to_string(), "42".to_string())));
    }

    #[test]
    fn form_post_variant_escapes_values() {
        let params = AuthorizationParameters {
            state: Some("<\"tag\">".to_string()),
            ..AuthorizationParameters::default()
        };
        let html = client().authorization_post(params).expect("should build");
        assert!(html.contains("onload=\"javascript:document.forms[0].submit()\""));
        assert!(html.contains("&lt;&quot;tag&quot;&gt;"));
        assert!(!html.contains("<\"tag\">"));
    }

    #[test]
    fn end_session_url_defaults() {
        let tokens = TokenSet {
            id_token: Some("a.b.c".to_string()),
            ..TokenSet::default()
        };
        let url = client()
            .end_session_url(EndSessionParameters {
                id_token_hint: Some(tokens.into()),
                ..EndSessionParameters::default()
            })
            .expect("should build");
        let pairs = query_pairs(&url);
        assert!(pairs.contains(&("id_token_hint".to_string(), "a.b.c".to_string())));
        assert!(pairs.contains(&(
            "post_logout_redirect_uri".to_string(),
            "https://rp.example.com/".to_string()
        )));
    }

    #[test]
    fn end_session_tokens_without_id_token() {
        let result = client().end_session_url(EndSessionParameters {
            id_token_hint: Some(TokenSet::default().into()),
            ..EndSessionParameters::default()
        });
        assert!(matches!(result, Err(crate::Error::Rp(RpError::MissingIdToken))));
    }
}
