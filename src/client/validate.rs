//! # ID Token Validation
//!
//! The multi-step validation every ID Token (and signed userinfo response)
//! goes through: decryption when the client registered an encrypted
//! response, header and payload parsing, per-context required claims,
//! issuer and timestamp checks with symmetric clock tolerance, `auth_time`
//! against `max_age`, nonce, audience and authorized party, the
//! `at_hash`/`c_hash`/`s_hash` companions, and finally the signature.
//!
//! The checks are pure over (token, client metadata, issuer keys, now); the
//! clock is sampled once per validation.

use serde_json::{Map, Value};

use super::Client;
use crate::error::RpError;
use crate::jose::jws::DecodedJws;
use crate::jose::{Header, hash, jwe, jws};

/// The endpoint a token was returned from, which decides claim
/// requiredness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TokenContext {
    /// Returned in the authorization response (front channel).
    Authorization,

    /// Returned by the token endpoint.
    Token,

    /// Returned by the userinfo endpoint as a JWT.
    Userinfo,
}

/// Whether a nonce comparison applies.
#[derive(Clone, Copy, Debug)]
pub(crate) enum NonceCheck<'a> {
    /// The check does not apply, e.g. on refresh.
    Skip,

    /// Compare against the nonce the request carried (or its absence).
    Expect(Option<&'a str>),
}

/// Expected values and companion artifacts for one validation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct IdTokenChecks<'a> {
    pub nonce: NonceCheck<'a>,
    pub max_age: Option<u64>,
    pub state: Option<&'a str>,
    pub access_token: Option<&'a str>,
    pub code: Option<&'a str>,
}

impl Default for IdTokenChecks<'_> {
    fn default() -> Self {
        Self {
            nonce: NonceCheck::Skip,
            max_age: None,
            state: None,
            access_token: None,
            code: None,
        }
    }
}

/// Which encrypted-response registration applies to a JWE.
#[derive(Clone, Copy, Debug)]
pub(crate) enum EncryptedResponse {
    IdToken,
    Userinfo,
}

impl Client {
    /// `true` when the client registered encrypted responses for the given
    /// artifact.
    pub(crate) fn expects_encrypted(&self, kind: EncryptedResponse) -> bool {
        match kind {
            EncryptedResponse::IdToken => {
                self.metadata().id_token_encrypted_response_alg.is_some()
            }
            EncryptedResponse::Userinfo => {
                self.metadata().userinfo_encrypted_response_alg.is_some()
            }
        }
    }

    /// Decrypt an encrypted response down to its plaintext, enforcing the
    /// registered `alg`/`enc` pair.
    ///
    /// The key is taken from the client keystore for asymmetric key
    /// management, and derived from `client_secret` otherwise.
    pub(crate) fn decrypt_response(
        &self, kind: EncryptedResponse, compact: &str,
    ) -> Result<Vec<u8>, RpError> {
        let metadata = self.metadata();
        let (expected_alg, expected_enc) = match kind {
            EncryptedResponse::IdToken => (
                metadata.id_token_encrypted_response_alg.as_deref(),
                metadata.id_token_encrypted_response_enc.as_deref(),
            ),
            EncryptedResponse::Userinfo => (
                metadata.userinfo_encrypted_response_alg.as_deref(),
                metadata.userinfo_encrypted_response_enc.as_deref(),
            ),
        };
        let expected_alg = expected_alg
            .ok_or_else(|| RpError::Config("encrypted response alg is not configured".to_string()))?;
        // registration default when enc is omitted
        let expected_enc = expected_enc.unwrap_or("A128CBC-HS256");

        let header_segment = compact.split('.').next().unwrap_or_default();
        let header: Header = serde_json::from_slice(&jws::segment(header_segment)?)
            .map_err(|e| RpError::Jwt(format!("failed to parse JWE header: {e}")))?;

        if header.alg != expected_alg {
            return Err(RpError::JweAlgMismatch {
                expected: expected_alg.to_string(),
                got: header.alg,
            });
        }
        if header.enc.as_deref() != Some(expected_enc) {
            return Err(RpError::JweEncMismatch {
                expected: expected_enc.to_string(),
                got: header.enc.unwrap_or_default(),
            });
        }

        let key = if expected_alg.starts_with("RSA") || expected_alg.starts_with("ECDH") {
            let jwks = self.key_set().ok_or_else(|| {
                RpError::Config(format!(
                    "a client jwks is required to decrypt {expected_alg} responses"
                ))
            })?;
            jwks.lookup(&header).ok_or(RpError::NoMatchingKey)?.clone()
        } else if expected_alg == "dir" {
            self.secret_for_alg(expected_enc)?
        } else {
            self.secret_for_alg(expected_alg)?
        };

        jwe::decrypt(compact, &key).map(|decrypted| decrypted.plaintext)
    }

    /// The signed (compact JWS) form of an ID Token, decrypting first when
    /// the client registered encrypted ID Token responses.
    pub(crate) fn decrypted_id_token(&self, id_token: &str) -> Result<String, RpError> {
        if !self.expects_encrypted(EncryptedResponse::IdToken) {
            return Ok(id_token.to_string());
        }
        let plaintext = self.decrypt_response(EncryptedResponse::IdToken, id_token)?;
        String::from_utf8(plaintext)
            .map_err(|_| RpError::Jwt("decrypted JWE payload is not valid UTF-8".to_string()))
    }

    /// Validate an ID Token (or userinfo JWS) and return its payload.
    ///
    /// Expects the compact JWS form; encrypted responses are decrypted
    /// before this is called.
    pub(crate) fn validate_id_token(
        &self, id_token: &str, ctx: TokenContext, checks: &IdTokenChecks<'_>,
    ) -> Result<Map<String, Value>, RpError> {
        let now = self.now();
        let tolerance = self.tolerance();
        let metadata = self.metadata();

        let decoded = jws::decode(id_token)?;

        let expected_alg = match ctx {
            TokenContext::Userinfo => {
                metadata.userinfo_signed_response_alg.as_deref().ok_or_else(|| {
                    RpError::Config("userinfo_signed_response_alg is not configured".to_string())
                })?
            }
            _ => metadata.id_token_signed_response_alg.as_str(),
        };
        if decoded.header.alg != expected_alg {
            return Err(RpError::AlgMismatch {
                expected: expected_alg.to_string(),
                got: decoded.header.alg.clone(),
            });
        }

        let payload = &decoded.payload;

        if ctx != TokenContext::Userinfo {
            for claim in ["iss", "sub", "aud", "exp", "iat"] {
                if !payload.contains_key(claim) {
                    return Err(missing(claim));
                }
            }
        }

        self.check_issuer(payload)?;
        self.check_timestamps(payload, now, tolerance)?;
        self.check_auth_time(payload, checks.max_age, now, tolerance)?;
        check_nonce(payload, checks.nonce)?;
        self.check_audience(payload)?;
        check_hashes(&decoded, ctx, checks)?;

        self.verify_signature(&decoded)?;
        Ok(decoded.payload)
    }

    fn check_issuer(&self, payload: &Map<String, Value>) -> Result<(), RpError> {
        let Some(iss) = payload.get("iss") else {
            return Ok(());
        };
        let iss = iss.as_str().unwrap_or_default();

        let mut expected = self.issuer().issuer.clone();
        if self.is_aad_multitenant() {
            if let Some(tid) = payload.get("tid").and_then(Value::as_str) {
                expected = expected.replace("{tenantid}", tid);
            }
        }

        if iss == expected {
            Ok(())
        } else {
            Err(RpError::IssuerMismatch {
                expected,
                got: iss.to_string(),
            })
        }
    }

    fn check_timestamps(
        &self, payload: &Map<String, Value>, now: i64, tolerance: i64,
    ) -> Result<(), RpError> {
        if let Some(iat) = numeric(payload, "iat")? {
            if iat > now + tolerance {
                return Err(RpError::IssuedInFuture { now, iat });
            }
        }
        if let Some(nbf) = numeric(payload, "nbf")? {
            if nbf > now + tolerance {
                return Err(RpError::NotYetActive { now, nbf });
            }
        }
        if let Some(exp) = numeric(payload, "exp")? {
            if now - tolerance >= exp {
                return Err(RpError::Expired { now, exp });
            }
        }
        Ok(())
    }

    fn check_auth_time(
        &self, payload: &Map<String, Value>, max_age: Option<u64>, now: i64, tolerance: i64,
    ) -> Result<(), RpError> {
        let required = max_age.is_some() || self.metadata().require_auth_time;
        if required && !payload.contains_key("auth_time") {
            return Err(missing("auth_time"));
        }

        let Some(auth_time) = numeric(payload, "auth_time")? else {
            return Ok(());
        };
        if let Some(max_age) = max_age {
            if auth_time + i64::try_from(max_age).unwrap_or(i64::MAX) < now - tolerance {
                return Err(RpError::MaxAgeExceeded);
            }
        }
        Ok(())
    }

    fn check_audience(&self, payload: &Map<String, Value>) -> Result<(), RpError> {
        let client_id = &self.metadata().client_id;

        match payload.get("aud") {
            None => {}
            Some(Value::String(aud)) => {
                if aud != client_id {
                    return Err(RpError::AudienceMismatch {
                        expected: client_id.clone(),
                        got: vec![aud.clone()],
                    });
                }
            }
            Some(Value::Array(auds)) => {
                let auds: Vec<String> = auds
                    .iter()
                    .map(|aud| aud.as_str().unwrap_or_default().to_string())
                    .collect();
                if auds.len() > 1 && !payload.contains_key("azp") {
                    return Err(missing("azp"));
                }
                if !auds.iter().any(|aud| aud == client_id) {
                    return Err(RpError::AudienceMismatch {
                        expected: client_id.clone(),
                        got: auds,
                    });
                }
            }
            Some(_) => {
                return Err(RpError::Jwt("aud must be a string or an array of strings".to_string()));
            }
        }

        if let Some(azp) = payload.get("azp").and_then(Value::as_str) {
            if azp != client_id {
                return Err(RpError::AzpMismatch {
                    expected: client_id.clone(),
                    got: azp.to_string(),
                });
            }
        }
        Ok(())
    }

    fn verify_signature(&self, decoded: &DecodedJws) -> Result<(), RpError> {
        let alg = decoded.header.alg.as_str();
        if alg == "none" {
            return Ok(());
        }

        let key = if alg.starts_with("HS") {
            self.secret_for_alg(alg)?
        } else {
            self.issuer().key(&decoded.header)?.clone()
        };
        jws::verify(decoded, &key)
    }
}

fn missing(claim: &'static str) -> RpError {
    RpError::MissingClaim(claim)
}

fn numeric(payload: &Map<String, Value>, claim: &'static str) -> Result<Option<i64>, RpError> {
    match payload.get(claim) {
        None => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or(RpError::NonNumericClaim(claim)),
    }
}

fn check_nonce(payload: &Map<String, Value>, check: NonceCheck<'_>) -> Result<(), RpError> {
    let NonceCheck::Expect(expected) = check else {
        return Ok(());
    };
    let got = payload.get("nonce").and_then(Value::as_str);

    match (expected, got) {
        (None, None) => Ok(()),
        (expected, got) if expected == got => Ok(()),
        (expected, got) => Err(RpError::NonceMismatch {
            expected: expected.unwrap_or_default().to_string(),
            got: got.unwrap_or_default().to_string(),
        }),
    }
}

fn check_hashes(
    decoded: &DecodedJws, ctx: TokenContext, checks: &IdTokenChecks<'_>,
) -> Result<(), RpError> {
    let alg = decoded.header.alg.as_str();
    let payload = &decoded.payload;
    let claim = |name: &str| payload.get(name).and_then(Value::as_str);

    match ctx {
        TokenContext::Authorization => {
            if let Some(access_token) = checks.access_token {
                let at_hash = claim("at_hash").ok_or_else(|| missing("at_hash"))?;
                hash::validate("at_hash", at_hash, alg, access_token)?;
            }
            if let Some(code) = checks.code {
                let c_hash = claim("c_hash").ok_or_else(|| missing("c_hash"))?;
                hash::validate("c_hash", c_hash, alg, code)?;
            }
            if let Some(s_hash) = claim("s_hash") {
                let state = checks.state.ok_or(RpError::Usage(
                    "cannot verify s_hash, \"checks.state\" property not provided",
                ))?;
                hash::validate("s_hash", s_hash, alg, state)?;
            }
        }
        TokenContext::Token => {
            if let (Some(access_token), Some(at_hash)) = (checks.access_token, claim("at_hash")) {
                hash::validate("at_hash", at_hash, alg, access_token)?;
            }
            if let (Some(code), Some(c_hash)) = (checks.code, claim("c_hash")) {
                hash::validate("c_hash", c_hash, alg, code)?;
            }
        }
        TokenContext::Userinfo => {}
    }
    Ok(())
}
