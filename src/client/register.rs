//! # Dynamic Client Registration
//!
//! Registering a fresh client at the Provider's registration endpoint and
//! recovering a previously registered client from its registration client
//! URI, per RFC 7591 / RFC 7592.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;

use super::{Client, ClientMetadata};
use crate::error::{Result, RpError};
use crate::http::{self, Expect};
use crate::issuer::Issuer;
use crate::jose::jwk::Jwks;

/// Options for [`Client::register`].
#[derive(Clone, Debug, Default)]
pub struct RegistrationOptions {
    /// Bearer token required by Providers that protect registration.
    pub initial_access_token: Option<String>,

    /// Private key set for the new client. Its public portion is exported
    /// into the registered `jwks` unless the properties already embed one.
    pub jwks: Option<Jwks>,
}

impl Client {
    /// Register a new client with the Provider and construct it from the
    /// registration response.
    ///
    /// # Errors
    ///
    /// Provider errors (anything but HTTP 201), transport failures, and
    /// invalid returned metadata.
    pub async fn register(
        issuer: impl Into<Arc<Issuer>>, properties: ClientMetadata, options: RegistrationOptions,
    ) -> Result<Self> {
        let issuer = issuer.into();
        let endpoint = issuer
            .registration_endpoint
            .clone()
            .ok_or(RpError::MissingEndpoint("registration_endpoint"))?;

        let mut body = serde_json::to_value(&properties)
            .map_err(|e| RpError::Config(format!("failed to serialize client metadata: {e}")))?;
        if let Some(jwks) = &options.jwks {
            let embeds_jwks = body.get("jwks").is_some();
            if !embeds_jwks {
                let public = serde_json::to_value(jwks.public_jwks()).map_err(|e| {
                    RpError::Config(format!("failed to serialize client jwks: {e}"))
                })?;
                body["jwks"] = public;
            }
        }

        let http_client = reqwest::Client::new();
        let mut request = http_client
            .post(&endpoint)
            .header(http::ACCEPT_HEADER, "application/json")
            .json(&body);
        if let Some(token) = &options.initial_access_token {
            let (header, value) = http::bearer(token);
            request = request.header(header, value);
        }

        let response = http::dispatch(request, Expect::Status(StatusCode::CREATED)).await?;
        let registered: ClientMetadata = response.json()?;

        let client = Self::new(issuer, registered)?.http_client(http_client);
        match options.jwks {
            Some(jwks) => client.jwks(jwks),
            None => Ok(client),
        }
    }

    /// Recover a registered client's current metadata from its
    /// registration client URI.
    ///
    /// # Errors
    ///
    /// Provider errors, transport failures, and invalid returned metadata.
    pub async fn from_uri(
        issuer: impl Into<Arc<Issuer>>, registration_client_uri: &str,
        registration_access_token: &str, jwks: Option<Jwks>,
    ) -> Result<Self> {
        let issuer = issuer.into();

        let http_client = reqwest::Client::new();
        let (header, value) = http::bearer(registration_access_token);
        let request = http_client
            .get(registration_client_uri)
            .header(http::ACCEPT_HEADER, "application/json")
            .header(header, value);

        let response = http::dispatch(request, Expect::Status(StatusCode::OK)).await?;
        let metadata: ClientMetadata = response.json()?;

        let client = Self::new(issuer, metadata)?.http_client(http_client);
        match jwks {
            Some(jwks) => client.jwks(jwks),
            None => Ok(client),
        }
    }

    /// The `registration_access_token` returned at registration, when the
    /// Provider issued one.
    #[must_use]
    pub fn registration_access_token(&self) -> Option<&str> {
        self.metadata().other.get("registration_access_token").and_then(Value::as_str)
    }
}
