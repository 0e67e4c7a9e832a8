//! # Callback Parameter Extraction
//!
//! Pulls the OIDC authorization response parameters out of whatever shape
//! the application hands over: a full redirect URL, an HTTP request with a
//! form-encoded body, or an already-parsed map. Only the recognized callback
//! keys are retained.

use serde::{Deserialize, Serialize};
use url::Url;

use super::Client;
use crate::core::urlencode;
use crate::error::{Result, RpError};

/// Parameters of an authorization response.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CallbackParams {
    /// Authorization code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// State echoed by the Provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// ID Token, for implicit and hybrid responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Access token, for implicit and hybrid responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Type of the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<String>,

    /// Granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Session state for Session Management.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,

    /// Error code returned by the Provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error description returned by the Provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Error URI returned by the Provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,

    /// JARM response JWT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Issuer identifier, RFC 9207.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl CallbackParams {
    /// Retain the recognized callback keys out of raw pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value = value.into();
            match key.as_ref() {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "id_token" => params.id_token = Some(value),
                "access_token" => params.access_token = Some(value),
                "token_type" => params.token_type = Some(value),
                "expires_in" => params.expires_in = Some(value),
                "scope" => params.scope = Some(value),
                "refresh_token" => params.refresh_token = Some(value),
                "session_state" => params.session_state = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                "error_uri" => params.error_uri = Some(value),
                "response" => params.response = Some(value),
                "iss" => params.iss = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// The shapes an authorization response can arrive in.
#[derive(Debug)]
pub enum CallbackInput<'a> {
    /// A full redirect URL; parameters are read from its query.
    Url(&'a str),

    /// An HTTP request. `GET` reads the URL query, `POST` reads the body.
    Request {
        /// Request method.
        method: &'a str,
        /// Request URL or path with query.
        url: &'a str,
        /// Request body, for `POST` callbacks.
        body: Option<CallbackBody<'a>>,
    },

    /// Parameters already extracted by the application.
    Params(CallbackParams),
}

/// A `POST` callback body.
#[derive(Debug)]
pub enum CallbackBody<'a> {
    /// Raw bytes, parsed as form-url-encoded.
    Bytes(&'a [u8]),

    /// Text, parsed as form-url-encoded.
    Text(&'a str),

    /// Pre-parsed form pairs.
    Form(Vec<(String, String)>),
}

impl Client {
    /// Extract callback parameters from a redirect URL, HTTP request, or
    /// parameter map.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable URL or an unsupported request method.
    pub fn callback_params(&self, input: CallbackInput<'_>) -> Result<CallbackParams> {
        match input {
            CallbackInput::Url(url) => Ok(CallbackParams::from_pairs(query_pairs(url)?)),
            CallbackInput::Request { method, url, body } => {
                match method.to_ascii_uppercase().as_str() {
                    "GET" => Ok(CallbackParams::from_pairs(query_pairs(url)?)),
                    "POST" => {
                        let pairs = match body {
                            Some(CallbackBody::Bytes(bytes)) => {
                                urlencode::form_decode(&String::from_utf8_lossy(bytes))
                            }
                            Some(CallbackBody::Text(text)) => urlencode::form_decode(text),
                            Some(CallbackBody::Form(pairs)) => pairs,
                            None => Vec::new(),
                        };
                        Ok(CallbackParams::from_pairs(pairs))
                    }
                    _ => Err(RpError::Usage(
                        "invalid callback request, only GET and POST are supported",
                    )
                    .into()),
                }
            }
            CallbackInput::Params(params) => Ok(params),
        }
    }
}

fn query_pairs(url: &str) -> Result<Vec<(String, String)>> {
    // tolerate bare paths by anchoring relative URLs
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => Url::parse("http://localhost")
            .expect("static base URL")
            .join(url)
            .map_err(|_| RpError::Usage("could not parse the callback URL"))?,
    };
    Ok(parsed.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientMetadata;
    use crate::issuer::Issuer;

    fn client() -> Client {
        Client::new(
            Issuer {
                issuer: "https://op.example.com".to_string(),
                ..Issuer::default()
            },
            ClientMetadata::new("rp"),
        )
        .expect("should construct")
    }

    #[test]
    fn url_input() {
        let params = client()
            .callback_params(CallbackInput::Url(
                "https://rp.example.com/cb?code=C&state=S&unrecognized=x",
            ))
            .expect("should parse");
        assert_eq!(params.code.as_deref(), Some("C"));
        assert_eq!(params.state.as_deref(), Some("S"));
        assert_eq!(params, CallbackParams {
            code: Some("C".to_string()),
            state: Some("S".to_string()),
            ..CallbackParams::default()
        });
    }

    #[test]
    fn get_request_input() {
        let params = client()
            .callback_params(CallbackInput::Request {
                method: "GET",
                url: "/cb?code=C&iss=https%3A%2F%2Fop.example.com",
                body: None,
            })
            .expect("should parse");
        assert_eq!(params.code.as_deref(), Some("C"));
        assert_eq!(params.iss.as_deref(), Some("https://op.example.com"));
    }

    #[test]
    fn post_request_input() {
        let params = client()
            .callback_params(CallbackInput::Request {
                method: "POST",
                url: "/cb",
                body: Some(CallbackBody::Bytes(b"code=C&session_state=ss")),
            })
            .expect("should parse");
        assert_eq!(params.code.as_deref(), Some("C"));
        assert_eq!(params.session_state.as_deref(), Some("ss"));
    }

    #[test]
    fn unsupported_method() {
        let result = client().callback_params(CallbackInput::Request {
            method: "PUT",
            url: "/cb",
            body: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn roundtrip_filters_to_recognized_keys() {
        let pairs = vec![
            ("code".to_string(), "C".to_string()),
            ("custom".to_string(), "x".to_string()),
        ];
        let params = CallbackParams::from_pairs(pairs);
        let serialized = serde_json::to_value(&params).expect("should serialize");
        assert_eq!(serialized, serde_json::json!({"code": "C"}));
    }
}
