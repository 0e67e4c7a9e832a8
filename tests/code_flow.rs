//! Authorization code flow, end to end against a mock Provider.

mod utils;

use serde_json::{Map, Value, json};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_rp::{
    AuthenticationExtras, AuthorizationParameters, CallbackChecks, CallbackExtras, CallbackInput,
};
use utils::{CLIENT_ID, REDIRECT_URI, at_hash, id_token_claims, sign_id_token};

#[tokio::test]
async fn code_flow() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let base = server.uri();
    let client = utils::client(&base);

    let mut claims = id_token_claims(&base);
    claims.insert("nonce".to_string(), Value::String("n".to_string()));
    claims.insert("at_hash".to_string(), Value::String(at_hash("A")));
    let id_token = sign_id_token(&Value::Object(claims));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=C"))
        .and(body_string_contains("code_verifier=v"))
        .and(body_string_contains("redirect_uri=https%3A%2F%2Frp.example.com%2Fcb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A",
            "token_type": "Bearer",
            "expires_in": 300,
            "id_token": id_token,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = client
        .callback_params(CallbackInput::Url(&format!("{REDIRECT_URI}?code=C&state=abc")))
        .expect("should parse");

    let tokens = client
        .callback(
            Some(REDIRECT_URI),
            params,
            CallbackChecks {
                response_type: Some("code".to_string()),
                state: Some("abc".to_string()),
                nonce: Some("n".to_string()),
                code_verifier: Some("v".to_string()),
                ..CallbackChecks::default()
            },
            CallbackExtras::default(),
        )
        .await
        .expect("the exchange and validation should succeed");

    assert_eq!(tokens.access_token.as_deref(), Some("A"));
    assert!(tokens.id_token.is_some());
    assert_eq!(
        tokens.claims().expect("claims decode").get("sub"),
        Some(&Value::String("user-1".to_string()))
    );
    assert!(!tokens.expired());
}

#[tokio::test]
async fn token_endpoint_error_is_op_origin() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let client = utils::client(&server.uri());

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code is expired"
        })))
        .mount(&server)
        .await;

    let params = client
        .callback_params(CallbackInput::Url(&format!("{REDIRECT_URI}?code=C")))
        .expect("should parse");
    let err = client
        .callback(
            Some(REDIRECT_URI),
            params,
            CallbackChecks::default(),
            CallbackExtras::default(),
        )
        .await
        .expect_err("the exchange fails");

    match err {
        oidc_rp::Error::Op(op) => {
            assert_eq!(op.error, "invalid_grant");
            assert_eq!(op.error_description.as_deref(), Some("code is expired"));
            assert_eq!(op.status, Some(400));
        }
        oidc_rp::Error::Rp(other) => panic!("expected an OP error, got {other}"),
    }
}

#[tokio::test]
async fn refresh_validates_the_new_id_token() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let base = server.uri();
    let client = utils::client(&base);

    let id_token = sign_id_token(&Value::Object(id_token_claims(&base)));
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "token_type": "Bearer",
            "id_token": id_token,
        })))
        .mount(&server)
        .await;

    let tokens = client
        .refresh("R", &AuthenticationExtras::default())
        .await
        .expect("refresh should succeed");
    assert_eq!(tokens.access_token.as_deref(), Some("A2"));
    assert!(tokens.id_token.is_some());
}

#[tokio::test]
async fn grant_posts_client_authentication() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let client = utils::client(&server.uri());

    // client_secret_basic: credentials ride the Authorization header
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header(
            "authorization",
            "Basic cnAtY2xpZW50OmErdmVyeSt3ZWxsK2tlcHQrc2VjcmV0",
        ))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = client
        .grant(
            vec![("grant_type".to_string(), "client_credentials".to_string())],
            &AuthenticationExtras::default(),
        )
        .await
        .expect("grant should succeed");
    assert_eq!(tokens.access_token.as_deref(), Some("A"));
}

#[tokio::test]
async fn authorization_url_carries_pkce_and_state() {
    utils::init_tracer();
    let client = utils::client("https://op.example.com");

    let verifier = oidc_rp::core::pkce::code_verifier();
    let url = client
        .authorization_url(AuthorizationParameters {
            state: Some("abc".to_string()),
            code_challenge: Some(oidc_rp::core::pkce::code_challenge(&verifier)),
            code_challenge_method: Some("S256".to_string()),
            ..AuthorizationParameters::default()
        })
        .expect("should build");

    let query: Vec<(String, String)> =
        url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    assert!(query.contains(&("client_id".to_string(), CLIENT_ID.to_string())));
    assert!(query.contains(&("code_challenge_method".to_string(), "S256".to_string())));
    assert!(query.iter().any(|(k, _)| k == "code_challenge"));
    assert!(query.iter().all(|(_, v)| !v.is_empty()));
}

#[tokio::test]
async fn introspect_and_revoke() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let client = utils::client(&server.uri());

    Mock::given(method("POST"))
        .and(path("/token/introspect"))
        .and(body_string_contains("token=A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "scope": "openid"
        })))
        .mount(&server)
        .await;

    let introspection: Map<String, Value> = client
        .introspect("A", None, &AuthenticationExtras::default())
        .await
        .expect("introspection should succeed");
    assert_eq!(introspection.get("active"), Some(&Value::Bool(true)));

    // RFC 7009: any 2xx concludes revocation, the body is ignored
    Mock::given(method("POST"))
        .and(path("/token/revoke"))
        .and(body_string_contains("token=A"))
        .and(body_string_contains("token_type_hint=access_token"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client
        .revoke("A", Some("access_token"), &AuthenticationExtras::default())
        .await
        .expect("revocation should succeed");
}
