//! Shared fixtures for the flow tests: a Provider key pair, ID Token
//! minting, and client construction against a mock Authorization Server.

use std::sync::{Mutex, OnceLock};

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use rsa::RsaPrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use serde_json::{Map, Value};

use oidc_rp::jose::jwk::{Jwk, Jwks};
use oidc_rp::jose::jws::{self, SigningKey};
use oidc_rp::jose::{Header, hash};
use oidc_rp::{Client, ClientMetadata, Issuer};

pub const CLIENT_ID: &str = "rp-client";
pub const CLIENT_SECRET: &str = "a very well kept secret";
pub const REDIRECT_URI: &str = "https://rp.example.com/cb";

/// Initialize tracing output for a test run.
pub fn init_tracer() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// The Provider's RSA signing key for this test run. Generated once;
/// 2048-bit keygen is too slow to repeat per test.
pub fn op_key() -> Jwk {
    static KEY: OnceLock<Jwk> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = aes_gcm::aead::OsRng;
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("should generate");

        let b64 = |n: &rsa::BigUint| Base64UrlUnpadded::encode_string(&n.to_bytes_be());
        let primes = private.primes();
        Jwk {
            kty: "RSA".to_string(),
            kid: Some("op-signing-key".to_string()),
            alg: Some("RS256".to_string()),
            use_: Some("sig".to_string()),
            n: Some(b64(private.n())),
            e: Some(b64(private.e())),
            d: Some(b64(private.d())),
            p: Some(b64(&primes[0])),
            q: Some(b64(&primes[1])),
            ..Jwk::default()
        }
    })
    .clone()
}

/// Mint an RS256 ID Token signed with the Provider key.
pub fn sign_id_token(claims: &Value) -> String {
    let key = op_key();
    let mut header = Header::from_alg("RS256");
    header.kid = key.kid.clone();
    jws::sign(&header, claims.as_object().expect("object claims"), &SigningKey::Key(&key))
        .expect("should sign")
}

/// Standard ID Token claims for `issuer`, issued now.
pub fn id_token_claims(issuer: &str) -> Map<String, Value> {
    let now = Utc::now().timestamp();
    serde_json::json!({
        "iss": issuer,
        "sub": "user-1",
        "aud": CLIENT_ID,
        "iat": now,
        "exp": now + 60,
    })
    .as_object()
    .expect("object")
    .clone()
}

/// The `at_hash` for an access token under RS256.
pub fn at_hash(access_token: &str) -> String {
    hash::left_half("RS256", access_token).expect("should hash")
}

/// An issuer record pointing every endpoint at the mock server.
pub fn issuer(base: &str) -> Issuer {
    Issuer {
        issuer: base.to_string(),
        authorization_endpoint: Some(format!("{base}/auth")),
        token_endpoint: Some(format!("{base}/token")),
        userinfo_endpoint: Some(format!("{base}/me")),
        end_session_endpoint: Some(format!("{base}/session/end")),
        device_authorization_endpoint: Some(format!("{base}/device")),
        introspection_endpoint: Some(format!("{base}/token/introspect")),
        revocation_endpoint: Some(format!("{base}/token/revoke")),
        registration_endpoint: Some(format!("{base}/register")),
        jwks: Jwks {
            keys: vec![op_key().public()],
        },
        ..Issuer::default()
    }
}

/// A confidential client against the mock server.
pub fn client(base: &str) -> Client {
    Client::new(issuer(base), ClientMetadata {
        client_secret: Some(CLIENT_SECRET.to_string()),
        redirect_uris: Some(vec![REDIRECT_URI.to_string()]),
        ..ClientMetadata::new(CLIENT_ID)
    })
    .expect("should construct")
}

/// Serialize access to the global issuer registry across tests.
pub fn registry_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}
