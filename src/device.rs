//! # Device Authorization Grant
//!
//! The RFC 8628 polling handle. The Provider hands out a `device_code` /
//! `user_code` pair; the application shows the user code and polls the token
//! endpoint at `interval` seconds until the flow concludes. The handle does
//! not sleep; callers time their polls with [`DeviceFlowHandle::interval`]
//! and stop once [`DeviceFlowHandle::expired`] reports true.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::Client;
use crate::error::Result;
use crate::token_set::TokenSet;

/// Seconds added to the polling interval on a `slow_down` response.
const SLOW_DOWN_BACKOFF: i64 = 5;

/// The device authorization endpoint's response, RFC 8628 §3.2.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DeviceAuthorizationResponse {
    /// Code the client polls the token endpoint with.
    pub device_code: String,

    /// Code the end user enters at the verification URI.
    pub user_code: String,

    /// Where the end user authorizes the device.
    pub verification_uri: String,

    /// Verification URI with the user code embedded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,

    /// Lifetime of the codes in seconds.
    pub expires_in: i64,

    /// Minimum seconds between polls. Defaults to 5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
}

/// A pending device authorization.
#[derive(Debug)]
pub struct DeviceFlowHandle<'a> {
    client: &'a Client,
    response: DeviceAuthorizationResponse,
    interval: i64,
    expires_at: i64,
    max_age: Option<u64>,
    exchange_body: Vec<(String, String)>,
    assertion_payload: Option<Map<String, Value>>,
}

impl<'a> DeviceFlowHandle<'a> {
    pub(crate) fn new(
        client: &'a Client, response: DeviceAuthorizationResponse, max_age: Option<u64>,
        exchange_body: Vec<(String, String)>, assertion_payload: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            interval: response.interval.unwrap_or(5).max(1),
            expires_at: Utc::now().timestamp() + response.expires_in,
            client,
            response,
            max_age,
            exchange_body,
            assertion_payload,
        }
    }

    /// Code the end user enters at the verification URI.
    #[must_use]
    pub fn user_code(&self) -> &str {
        &self.response.user_code
    }

    /// Code this handle polls the token endpoint with.
    #[must_use]
    pub fn device_code(&self) -> &str {
        &self.response.device_code
    }

    /// Where the end user authorizes the device.
    #[must_use]
    pub fn verification_uri(&self) -> &str {
        &self.response.verification_uri
    }

    /// Verification URI with the user code embedded, when provided.
    #[must_use]
    pub fn verification_uri_complete(&self) -> Option<&str> {
        self.response.verification_uri_complete.as_deref()
    }

    /// Current minimum seconds between polls. Grows when the Provider asks
    /// to slow down.
    #[must_use]
    pub const fn interval(&self) -> i64 {
        self.interval
    }

    /// Absolute expiry of the device code.
    #[must_use]
    pub const fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Remaining device code lifetime in seconds, clamped at zero.
    #[must_use]
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - Utc::now().timestamp()).max(0)
    }

    /// `true` once the device code lifetime has elapsed.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expires_in() == 0
    }

    /// Poll the token endpoint once.
    ///
    /// Returns `Ok(None)` while authorization is pending (`slow_down`
    /// increases [`Self::interval`] by five seconds), and `Ok(Some(tokens))`
    /// once the user approved. Terminal Provider errors such as
    /// `access_denied` and `expired_token` are returned as errors.
    ///
    /// # Errors
    ///
    /// Terminal Provider errors, transport failures, and ID Token
    /// validation failures.
    pub async fn poll(&mut self) -> Result<Option<TokenSet>> {
        let mut body = vec![
            (
                "grant_type".to_string(),
                "urn:ietf:params:oauth:grant-type:device_code".to_string(),
            ),
            ("device_code".to_string(), self.response.device_code.clone()),
        ];
        body.extend(self.exchange_body.iter().cloned());

        match self
            .client
            .device_token_exchange(body, self.max_age, self.assertion_payload.as_ref())
            .await
        {
            Ok(tokens) => Ok(Some(tokens)),
            Err(crate::Error::Op(op)) if op.error == "authorization_pending" => Ok(None),
            Err(crate::Error::Op(op)) if op.error == "slow_down" => {
                self.interval += SLOW_DOWN_BACKOFF;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
