//! # Error Taxonomy
//!
//! Errors raised while driving Relying Party flows fall into two disjoint
//! families:
//!
//! * [`OpError`] — the OpenID Provider returned an OAuth 2.0 error object or
//!   an unexpected HTTP response. These are the Provider's to explain and the
//!   caller's to retry.
//! * [`RpError`] — a locally-detected protocol or configuration violation:
//!   a missing claim, an algorithm mismatch, a failed signature check, or
//!   misuse of the library API. These are fatal at the call site.
//!
//! Both families bubble to the caller unmodified through [`Error`]; only
//! distributed-claim resolution annotates errors with the offending source
//! name before re-raising.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for all public Relying Party operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Union of the two error families raised by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The OpenID Provider returned an error.
    #[error(transparent)]
    Op(#[from] OpError),

    /// A protocol or configuration violation detected by this library.
    #[error(transparent)]
    Rp(#[from] RpError),
}

/// An OAuth 2.0 error returned by the OpenID Provider, or an HTTP-level
/// failure talking to it.
///
/// Fields mirror the error response members of [RFC 6749] and
/// [OpenID Connect Core], retaining whichever the Provider sent.
///
/// [RFC 6749]: https://www.rfc-editor.org/rfc/rfc6749.html#section-5.2
/// [OpenID Connect Core]: https://openid.net/specs/openid-connect-core-1_0.html#AuthError
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OpError {
    /// Machine-readable error code.
    pub error: String,

    /// Human-readable description of the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// URI of a web page with information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,

    /// The `state` parameter echoed by the Provider, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Granted scope, when the Provider reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Session state for OpenID Connect Session Management.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,

    /// HTTP status of the response the error was extracted from, when the
    /// failure was transport-level.
    #[serde(skip)]
    pub status: Option<u16>,
}

impl OpError {
    /// Build an error from an unexpected HTTP response, attempting to parse
    /// the body as an OAuth 2.0 error object first.
    ///
    /// A body that does not parse becomes a `server_error` retaining the
    /// status line in the description.
    #[must_use]
    pub fn from_response(expected: &str, status: u16, status_text: &str, body: &[u8]) -> Self {
        if let Ok(mut parsed) = serde_json::from_slice::<Self>(body) {
            if !parsed.error.is_empty() {
                parsed.status = Some(status);
                return parsed;
            }
        }
        Self {
            error: "server_error".to_string(),
            error_description: Some(format!("expected {expected}, got: {status} {status_text}")),
            status: Some(status),
            ..Self::default()
        }
    }

    /// Build an error from a transport-level failure (connect, TLS, body
    /// read). No OAuth error object is available in this case.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: Some(message.into()),
            ..Self::default()
        }
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(description) = &self.error_description {
            write!(f, " ({description})")?;
        }
        Ok(())
    }
}

impl std::error::Error for OpError {}

/// A protocol or configuration violation detected by the Relying Party.
///
/// Messages never contain secrets. Signature verification failures are
/// normalized to a single generic message regardless of the underlying
/// JOSE diagnostic.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpError {
    /// The client or issuer configuration cannot support the attempted
    /// operation.
    #[error("{0}")]
    Config(String),

    /// The caller misused the API, e.g. omitted a check that the response
    /// parameters require.
    #[error("{0}")]
    Usage(&'static str),

    /// The issuer metadata does not carry an endpoint the call needs.
    #[error("{0} must be configured on the issuer")]
    MissingEndpoint(&'static str),

    /// A JOSE algorithm outside the supported set was requested.
    #[error("unsupported JOSE algorithm {0}")]
    UnsupportedAlgorithm(String),

    /// A JWT or JWE was structurally malformed.
    #[error("{0}")]
    Jwt(String),

    /// No key in the relevant JWKS matched the JOSE header.
    #[error("no matching key found in the key set")]
    NoMatchingKey,

    /// The `id_token` member was absent from a token response that must
    /// carry one.
    #[error("id_token not present in TokenSet")]
    MissingIdToken,

    /// A parameter implied by the expected `response_type` was absent.
    #[error("{0} missing from response")]
    MissingParam(&'static str),

    /// Artifacts were present although `response_type=none` forbids them.
    #[error("unexpected params encountered for \"none\" response")]
    UnexpectedParams,

    /// An `id_token` appeared in a plain OAuth 2.0 callback.
    #[error("id_token detected in the response, you must use callback() instead of oauth_callback()")]
    UnexpectedIdToken,

    /// The userinfo endpoint did not honour `Accept: application/jwt`.
    #[error("expected application/jwt response from the userinfo_endpoint")]
    ExpectedJwtResponse,

    /// JWS `alg` differs from the configured signed-response algorithm.
    #[error("unexpected JWT alg received, expected {expected}, got: {got}")]
    AlgMismatch {
        /// Configured algorithm.
        expected: String,
        /// Algorithm found in the JOSE header.
        got: String,
    },

    /// JWE `alg` differs from the configured encrypted-response algorithm.
    #[error("unexpected JWE alg received, expected {expected}, got: {got}")]
    JweAlgMismatch {
        /// Configured key-management algorithm.
        expected: String,
        /// Algorithm found in the JWE header.
        got: String,
    },

    /// JWE `enc` differs from the configured encrypted-response encoding.
    #[error("unexpected JWE enc received, expected {expected}, got: {got}")]
    JweEncMismatch {
        /// Configured content-encryption algorithm.
        expected: String,
        /// Encoding found in the JWE header.
        got: String,
    },

    /// A claim required in the current validation context is absent.
    #[error("missing required JWT property {0}")]
    MissingClaim(&'static str),

    /// A timestamp claim is not a JSON numeric value.
    #[error("JWT {0} claim must be a JSON numeric value")]
    NonNumericClaim(&'static str),

    /// The `iss` claim differs from the issuer identifier.
    #[error("unexpected iss value, expected {expected}, got: {got}")]
    IssuerMismatch {
        /// Expected issuer identifier.
        expected: String,
        /// Value of the `iss` claim.
        got: String,
    },

    /// `iat` is ahead of the current time beyond tolerance.
    #[error("JWT issued in the future, now {now}, iat {iat}")]
    IssuedInFuture {
        /// Clock sample used for the validation.
        now: i64,
        /// Value of the `iat` claim.
        iat: i64,
    },

    /// `nbf` is ahead of the current time beyond tolerance.
    #[error("JWT not active yet, now {now}, nbf {nbf}")]
    NotYetActive {
        /// Clock sample used for the validation.
        now: i64,
        /// Value of the `nbf` claim.
        nbf: i64,
    },

    /// `exp` is behind the current time beyond tolerance.
    #[error("JWT expired, now {now}, exp {exp}")]
    Expired {
        /// Clock sample used for the validation.
        now: i64,
        /// Value of the `exp` claim.
        exp: i64,
    },

    /// `auth_time` is older than the requested `max_age` allows.
    #[error("too much time has elapsed since the last End-User authentication")]
    MaxAgeExceeded,

    /// The `nonce` claim differs from the nonce the request carried.
    #[error("nonce mismatch, expected {expected}, got: {got}")]
    NonceMismatch {
        /// Nonce the Relying Party sent.
        expected: String,
        /// Value of the `nonce` claim.
        got: String,
    },

    /// The callback `state` differs from the expected value.
    #[error("state mismatch, expected {expected}, got: {got}")]
    StateMismatch {
        /// State the Relying Party sent.
        expected: String,
        /// State returned in the callback.
        got: String,
    },

    /// `aud` does not include this client.
    #[error("aud is missing the client_id, expected {expected} to be included in {got:?}")]
    AudienceMismatch {
        /// This client's identifier.
        expected: String,
        /// Value of the `aud` claim.
        got: Vec<String>,
    },

    /// `azp` names a different client.
    #[error("azp mismatch, expected {expected}, got: {got}")]
    AzpMismatch {
        /// This client's identifier.
        expected: String,
        /// Value of the `azp` claim.
        got: String,
    },

    /// An `at_hash`/`c_hash`/`s_hash` claim did not match its companion
    /// artifact.
    #[error("{name} mismatch, expected {expected}, got: {got}")]
    HashMismatch {
        /// Which hash claim failed.
        name: &'static str,
        /// Hash computed over the companion artifact.
        expected: String,
        /// Value carried in the token.
        got: String,
    },

    /// Signature (or MAC) verification failed.
    #[error("failed to validate JWT signature")]
    SignatureVerification,

    /// A refreshed ID Token names a different subject.
    #[error("sub mismatch, expected {expected}, got: {got}")]
    SubMismatch {
        /// `sub` asserted by the previous ID Token.
        expected: String,
        /// `sub` asserted by the new one.
        got: String,
    },

    /// The userinfo `sub` differs from the ID Token `sub`.
    #[error("userinfo sub mismatch, expected {expected}, got: {got}")]
    UserinfoSubMismatch {
        /// `sub` asserted by the ID Token.
        expected: String,
        /// `sub` returned by the userinfo endpoint.
        got: String,
    },

    /// A distributed or aggregated claim source failed; carries the source
    /// name and the underlying error.
    #[error("claim source {name}: {source}")]
    ClaimSource {
        /// Key of the failing `_claim_sources` entry.
        name: String,
        /// The error the source produced.
        source: Box<Error>,
    },
}

impl RpError {
    /// Annotate an error with the claim-source name it originated from.
    #[must_use]
    pub fn claim_source(name: impl Into<String>, error: Error) -> Self {
        Self::ClaimSource {
            name: name.into(),
            source: Box::new(error),
        }
    }
}
