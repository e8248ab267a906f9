#![allow(clippy::unwrap_used)]
// Integration tests for `AuthClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hublink_api::{AuthClient, Error, HubConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, AuthClient) {
    let server = MockServer::start().await;
    let api_url = Url::parse(&format!("{}/", server.uri())).unwrap();
    let websocket_url = Url::parse("ws://unused.invalid/socket/websocket").unwrap();

    let mut config = HubConfig::with_base(api_url, websocket_url);
    config.timeout = Duration::from_secs(5);

    let client = AuthClient::with_client(reqwest::Client::new(), config);
    (server, client)
}

fn secret(raw: &str) -> secrecy::SecretString {
    raw.to_string().into()
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(json!({
            "email": "resident@example.com",
            "password": "hunter2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "acc-token",
            "refresh_token": "ref-token",
            "expires": 1_900_000_000
        })))
        .mount(&server)
        .await;

    let tokens = client
        .login("resident@example.com", &secret("hunter2"))
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "acc-token");
    assert_eq!(tokens.refresh_token, "ref-token");
    assert_eq!(tokens.expires, 1_900_000_000);
}

#[tokio::test]
async fn test_login_rejected_credentials() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "code": "unauthorized", "description": "Invalid credentials" }]
        })))
        .mount(&server)
        .await;

    let result = client.login("resident@example.com", &secret("wrong")).await;

    let Err(Error::Authentication { message }) = result else {
        panic!("expected Authentication error, got: {result:?}");
    };
    assert_eq!(message, "Invalid credentials");
}

#[tokio::test]
async fn test_login_server_error_is_not_auth() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client.login("resident@example.com", &secret("pw")).await;

    assert!(
        matches!(result, Err(Error::Api { status: 500, .. })),
        "expected Api error, got: {result:?}"
    );
}

// ── Token refresh ───────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_sends_the_refresh_header() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/tokens"))
        .and(header("authorization-x-refresh", "ref-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "acc-2",
            "refresh_token": "ref-2",
            "expires": 1_900_000_100
        })))
        .mount(&server)
        .await;

    let tokens = client.refresh("ref-token").await.unwrap();
    assert_eq!(tokens.access_token, "acc-2");
}

#[tokio::test]
async fn test_refresh_with_stale_token() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/tokens"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "code": "unauthorized" }]
        })))
        .mount(&server)
        .await;

    let result = client.refresh("stale").await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}
