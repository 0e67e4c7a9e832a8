//! Dynamic client registration, RFC 7591 / RFC 7592.

mod utils;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_rp::{Client, ClientMetadata, RegistrationOptions};

#[tokio::test]
async fn register_expects_created() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let issuer = utils::issuer(&server.uri());

    Mock::given(method("POST"))
        .and(path("/register"))
        .and(header("authorization", "Bearer initial-token"))
        .and(body_partial_json(json!({"redirect_uris": ["https://rp.example.com/cb"]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "client_id": "generated-id",
            "client_secret": "generated-secret",
            "registration_access_token": "rat",
            "registration_client_uri": format!("{}/register/generated-id", server.uri()),
            "redirect_uris": ["https://rp.example.com/cb"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::register(
        issuer,
        ClientMetadata {
            client_id: "ignored-on-registration".to_string(),
            redirect_uris: Some(vec!["https://rp.example.com/cb".to_string()]),
            ..ClientMetadata::default()
        },
        RegistrationOptions {
            initial_access_token: Some("initial-token".to_string()),
            jwks: None,
        },
    )
    .await
    .expect("registration should succeed");

    assert_eq!(client.metadata().client_id, "generated-id");
    assert_eq!(client.registration_access_token(), Some("rat"));
}

#[tokio::test]
async fn register_rejects_other_statuses() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let issuer = utils::issuer(&server.uri());

    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client_id": "generated-id"
        })))
        .mount(&server)
        .await;

    let err = Client::register(issuer, ClientMetadata::default(), RegistrationOptions::default())
        .await
        .expect_err("200 is not 201 Created");
    match err {
        oidc_rp::Error::Op(op) => {
            assert_eq!(op.error_description.as_deref(), Some("expected 201 Created, got: 200 OK"));
        }
        oidc_rp::Error::Rp(other) => panic!("expected an OP error, got {other}"),
    }
}

#[tokio::test]
async fn from_uri_recovers_a_client() {
    utils::init_tracer();
    let server = MockServer::start().await;
    let issuer = utils::issuer(&server.uri());

    Mock::given(method("GET"))
        .and(path("/register/generated-id"))
        .and(header("authorization", "Bearer rat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "client_id": "generated-id",
            "client_secret": "generated-secret"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::from_uri(
        issuer,
        &format!("{}/register/generated-id", server.uri()),
        "rat",
        None,
    )
    .await
    .expect("recovery should succeed");
    assert_eq!(client.metadata().client_id, "generated-id");
    assert_eq!(client.metadata().client_secret.as_deref(), Some("generated-secret"));
}
