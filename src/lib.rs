//! An OpenID Connect Relying Party and OAuth 2.0 client library based on
//! [OpenID Connect Core 1.0](https://openid.net/specs/openid-connect-core-1_0.html)
//! and the surrounding RFCs: authorization code (with [PKCE]), implicit and
//! hybrid callbacks, refresh, userinfo, token introspection and revocation,
//! the device authorization grant, distributed and aggregated claims, and
//! dynamic client registration.
//!
//! # Design
//!
//! The library is architected around a [`Client`] bound to an [`Issuer`]:
//! the issuer record carries the Provider's endpoints, keys, and advertised
//! capabilities (produced by whatever discovery layer the application
//! uses); the client carries the registered metadata and drives the
//! protocol. Every response passes the full OpenID Connect validation rules
//! before it reaches the application, most importantly the multi-step ID
//! Token checks in the token validator.
//!
//! A client is re-entrant: concurrent requests share only immutable
//! metadata and an append-only cache of keys derived from the
//! `client_secret`.
//!
//! # Example
//!
//! ```rust,ignore
//! use oidc_rp::{AuthorizationParameters, CallbackChecks, Client, ClientMetadata, Issuer};
//!
//! let issuer: Issuer = discover_somehow().await?;
//! let client = Client::new(issuer, ClientMetadata {
//!     client_secret: Some(secret),
//!     redirect_uris: Some(vec!["https://rp.example.com/cb".into()]),
//!     ..ClientMetadata::new("client-id")
//! })?;
//!
//! let url = client.authorization_url(AuthorizationParameters {
//!     state: Some(oidc_rp::core::generate::state()),
//!     nonce: Some(oidc_rp::core::generate::nonce()),
//!     ..AuthorizationParameters::default()
//! })?;
//! // redirect the user to `url`, then consume the callback:
//! let params = client.callback_params(oidc_rp::CallbackInput::Url(&callback_url))?;
//! let tokens = client
//!     .callback(Some("https://rp.example.com/cb"), params, CallbackChecks {
//!         state: Some(state),
//!         nonce: Some(nonce),
//!         ..CallbackChecks::default()
//!     }, Default::default())
//!     .await?;
//! ```
//!
//! [PKCE]: https://www.rfc-editor.org/rfc/rfc7636

pub mod client;
pub mod core;
pub mod device;
pub mod issuer;
pub mod jose;
pub mod token_set;

mod error;
mod http;

pub use client::{
    AuthenticationExtras, AuthorizationParameters, CallbackBody, CallbackChecks, CallbackExtras,
    CallbackInput, CallbackParams, Client, ClientMetadata, EndSessionParameters, IdTokenHint,
    RefreshInput, RegistrationOptions, UserinfoOptions, UserinfoToken, UserinfoVia,
};
pub use device::{DeviceAuthorizationResponse, DeviceFlowHandle};
pub use error::{Error, OpError, Result, RpError};
pub use issuer::{Issuer, MtlsEndpointAliases};
pub use token_set::TokenSet;
