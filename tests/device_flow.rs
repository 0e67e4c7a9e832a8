//! Device authorization grant polling, RFC 8628.

mod utils;

use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_rp::AuthenticationExtras;
use utils::{id_token_claims, sign_id_token};

#[tokio::test]
async fn polling_transitions() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let base = server.uri();
    let client = utils::client(&base);

    Mock::given(method("POST"))
        .and(path("/device"))
        .and(body_string_contains("client_id=rp-client"))
        .and(body_string_contains("scope=openid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "D",
            "user_code": "ABCD-EFGH",
            "verification_uri": format!("{base}/activate"),
            "verification_uri_complete": format!("{base}/activate?user_code=ABCD-EFGH"),
            "expires_in": 600,
            "interval": 5
        })))
        .mount(&server)
        .await;

    // token endpoint: pending, then slow_down, then success
    let pending = ResponseTemplate::new(400).set_body_json(json!({
        "error": "authorization_pending"
    }));
    let slow_down = ResponseTemplate::new(400).set_body_json(json!({
        "error": "slow_down"
    }));
    let id_token = sign_id_token(&Value::Object(id_token_claims(&base)));
    let granted = ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "A",
        "token_type": "Bearer",
        "id_token": id_token
    }));

    let device_grant = || {
        Mock::given(method("POST")).and(path("/token")).and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code",
        ))
    };
    device_grant().respond_with(pending).up_to_n_times(1).mount(&server).await;
    device_grant().respond_with(slow_down).up_to_n_times(1).mount(&server).await;
    device_grant().respond_with(granted).mount(&server).await;

    let mut handle = client
        .device_authorization(serde_json::Map::new(), &AuthenticationExtras::default())
        .await
        .expect("device authorization should start");

    assert_eq!(handle.user_code(), "ABCD-EFGH");
    assert_eq!(handle.device_code(), "D");
    assert_eq!(handle.interval(), 5);
    assert!(!handle.expired());

    // authorization_pending: still pending, interval unchanged
    let outcome = handle.poll().await.expect("pending is not an error");
    assert!(outcome.is_none());
    assert_eq!(handle.interval(), 5);

    // slow_down: still pending, interval grows by five seconds
    let outcome = handle.poll().await.expect("slow_down is not an error");
    assert!(outcome.is_none());
    assert_eq!(handle.interval(), 10);

    // granted
    let tokens = handle.poll().await.expect("grant concludes").expect("tokens returned");
    assert_eq!(tokens.access_token.as_deref(), Some("A"));
    assert!(tokens.id_token.is_some());
}

#[tokio::test]
async fn denial_is_terminal() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let base = server.uri();
    let client = utils::client(&base);

    Mock::given(method("POST"))
        .and(path("/device"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "D",
            "user_code": "ABCD-EFGH",
            "verification_uri": format!("{base}/activate"),
            "expires_in": 600
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "access_denied"
        })))
        .mount(&server)
        .await;

    let mut handle = client
        .device_authorization(serde_json::Map::new(), &AuthenticationExtras::default())
        .await
        .expect("device authorization should start");

    let err = handle.poll().await.expect_err("denial is terminal");
    match err {
        oidc_rp::Error::Op(op) => assert_eq!(op.error, "access_denied"),
        oidc_rp::Error::Rp(other) => panic!("expected an OP error, got {other}"),
    }
}
