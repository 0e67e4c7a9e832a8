//! # HTTP Primitive
//!
//! The single request primitive every flow goes through: form-encoded POSTs
//! and JSON GETs with `Accept` negotiation, unexpected responses converted
//! into the AS-origin error family. Timeouts and proxies belong to the
//! `reqwest::Client` the caller configures; this layer adds none.

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

pub(crate) use http::header::{
    ACCEPT as ACCEPT_HEADER, AUTHORIZATION as AUTHORIZATION_HEADER,
    CONTENT_TYPE as CONTENT_TYPE_HEADER,
};

use crate::error::{OpError, Result};

/// Response status a flow considers successful.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Expect {
    /// Exactly this status.
    Status(StatusCode),

    /// Any 2xx, as RFC 7009 allows for revocation.
    Success,
}

impl Expect {
    fn describe(self) -> &'static str {
        match self {
            Self::Status(status) if status == StatusCode::CREATED => "201 Created",
            _ => "200 OK",
        }
    }
}

/// A fully-read HTTP response.
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// An unparsable body is attributed to the Provider.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            OpError {
                error: "server_error".to_string(),
                error_description: Some(format!("failed to parse response body: {e}")),
                status: Some(self.status.as_u16()),
                ..OpError::default()
            }
            .into()
        })
    }
}

/// Dispatch a request, read the body, and enforce the expected status.
///
/// Responses outside `expected` are parsed as OAuth error objects where
/// possible and raised as [`OpError`].
pub(crate) async fn dispatch(request: RequestBuilder, expected: Expect) -> Result<RawResponse> {
    let response = request.send().await.map_err(|e| OpError::transport(e.to_string()))?;
    read(response, expected).await
}

async fn read(response: Response, expected: Expect) -> Result<RawResponse> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let body = response.bytes().await.map_err(|e| OpError::transport(e.to_string()))?.to_vec();

    debug!(status = status.as_u16(), "provider response");

    let acceptable = match expected {
        Expect::Status(wanted) => status == wanted,
        Expect::Success => status.is_success(),
    };
    if !acceptable {
        return Err(OpError::from_response(
            expected.describe(),
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            &body,
        )
        .into());
    }

    Ok(RawResponse {
        status,
        content_type,
        body,
    })
}

/// Attach `Accept` and a form body to a POST.
pub(crate) fn form_post(
    client: &reqwest::Client, url: &str, accept: &str, form: &[(String, String)],
) -> RequestBuilder {
    let body = serde_urlencoded::to_string(form).unwrap_or_default();
    client
        .post(url)
        .header(ACCEPT, accept)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
}

/// `Authorization: Basic` header value from pre-encoded credentials.
pub(crate) fn basic_auth(user: &str, password: &str) -> String {
    use base64ct::{Base64, Encoding};
    format!("Basic {}", Base64::encode_string(format!("{user}:{password}").as_bytes()))
}

/// `Authorization: Bearer` header value.
pub(crate) fn bearer(token: &str) -> (http::HeaderName, String) {
    (AUTHORIZATION, format!("Bearer {token}"))
}
