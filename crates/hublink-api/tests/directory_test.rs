#![allow(clippy::unwrap_used)]
// Integration tests for `DirectoryClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hublink_api::{DirectoryClient, Error, HubConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DirectoryClient) {
    let server = MockServer::start().await;
    let api_url = Url::parse(&format!("{}/", server.uri())).unwrap();
    let websocket_url = Url::parse("ws://unused.invalid/socket/websocket").unwrap();

    let config = HubConfig::with_base(api_url, websocket_url);
    let client = DirectoryClient::with_client(reqwest::Client::new(), config, "acc-token");
    (server, client)
}

async fn mount_hubs(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/hubs"))
        .and(header("authorization", "Bearer acc-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "hub-1" }])))
        .mount(server)
        .await;
}

// ── Device listing ──────────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_walks_every_hub() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/hubs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "hub-1" },
            { "id": "hub-2" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/hubs/hub-1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 412,
            "name": "Front Door",
            "type": "entry_control",
            "attributes": [
                { "name": "locked", "state": "true" },
                { "name": "notifications" }
            ]
        }])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/hubs/hub-2/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 907,
            "name": "Hallway",
            "type": "thermostat",
            "attributes": [
                { "name": "mode", "state": "cool" },
                { "name": "current_temp", "state": "71.5" }
            ]
        }])))
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id, 412);
    assert_eq!(devices[0].kind, "entry_control");
    assert_eq!(devices[0].attributes[0].state.as_deref(), Some("true"));
    assert_eq!(devices[0].attributes[1].state, None);
    assert_eq!(devices[1].name, "Hallway");
}

#[tokio::test]
async fn test_list_devices_sends_the_bearer_token() {
    let (server, client) = setup().await;

    mount_hubs(&server).await;
    Mock::given(method("GET"))
        .and(path("/hubs/hub-1/devices"))
        .and(header("authorization", "Bearer acc-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let devices = client.list_devices().await.unwrap();
    assert!(devices.is_empty());
}

#[tokio::test]
async fn test_stale_token_surfaces_as_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/hubs"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "code": "unauthorized", "description": "Token expired" }]
        })))
        .mount(&server)
        .await;

    let result = client.list_devices().await;

    let Err(Error::Authentication { message }) = result else {
        panic!("expected Authentication error, got: {result:?}");
    };
    assert_eq!(message, "Token expired");
}

#[tokio::test]
async fn test_unauthorized_envelope_with_odd_status() {
    let (server, client) = setup().await;

    // Some deployments report token problems as 400 with an
    // `unauthorized` code in the envelope.
    Mock::given(method("GET"))
        .and(path("/hubs"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{ "code": "unauthorized" }]
        })))
        .mount(&server)
        .await;

    let result = client.list_devices().await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn test_api_error_passes_through() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/hubs"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = client.list_devices().await;
    assert!(matches!(result, Err(Error::Api { status: 503, .. })));
}
