//! # JOSE
//!
//! Signing, verification, encryption, and key handling for the JWT artifacts
//! a Relying Party produces and consumes: ID Tokens, userinfo responses,
//! client-authentication assertions, and request objects.
//!
//! JWS uses compact serialization (three dot-separated base64url segments),
//! JWE likewise with five. The supported algorithm subsets are listed in
//! [`jws`] and [`jwe`].

pub mod derive;
pub mod hash;
pub mod jwe;
pub mod jwk;
pub mod jws;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JOSE protected header, shared between the JWS and JWE views.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Header {
    /// Signature or key-management algorithm.
    pub alg: String,

    /// Content-encryption algorithm (JWE only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enc: Option<String>,

    /// Identifier of the key used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Media type of the complete JOSE object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// Media type of the secured content, e.g. `JWT` for nested tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,

    /// Initialization vector for `A*GCMKW` key wrapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,

    /// Authentication tag for `A*GCMKW` key wrapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Any further header parameters.
    #[serde(flatten)]
    pub other: serde_json::Map<String, Value>,
}

impl Header {
    /// A header carrying only an algorithm.
    #[must_use]
    pub fn from_alg(alg: impl Into<String>) -> Self {
        Self {
            alg: alg.into(),
            ..Self::default()
        }
    }
}
