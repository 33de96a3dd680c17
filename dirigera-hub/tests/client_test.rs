// Integration tests for `HubClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dirigera_hub::{HubClient, HubError, HubTransport};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HubClient) {
    let server = MockServer::start().await;
    let api_url = Url::parse(&format!("{}/v1/", server.uri())).unwrap();
    let events_url = Url::parse("ws://127.0.0.1:1/v1").unwrap();
    let client = HubClient::with_client(
        reqwest::Client::new(),
        api_url,
        events_url,
        SecretString::from("secret-token".to_string()),
    );
    (server, client)
}

// ── Devices ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_all_devices() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "d1",
                "type": "light",
                "deviceType": "light",
                "isReachable": true,
                "attributes": {"customName": "Lamp", "isOn": true},
                "room": {"id": "r1", "name": "Kitchen", "color": "", "icon": ""}
            },
            {
                "id": "d2",
                "type": "outlet",
                "deviceType": "outlet",
                "attributes": {"customName": "Plug", "isOn": false}
            }
        ])))
        .mount(&server)
        .await;

    let devices = client.fetch_all_devices().await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id, "d1");
    assert_eq!(devices[0].room_name(), Some("Kitchen"));
    assert_eq!(devices[1].device_type, "outlet");
}

#[tokio::test]
async fn test_undecodable_device_is_skipped() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"type": "light", "deviceType": "light"},
            {"id": "d2", "type": "outlet", "deviceType": "outlet"}
        ])))
        .mount(&server)
        .await;

    let devices = client.fetch_all_devices().await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, "d2");
}

#[tokio::test]
async fn test_undecodable_known_device_fails_fetch() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "d1", "type": "light", "deviceType": 42},
            {"id": "d2", "type": "outlet", "deviceType": "outlet"}
        ])))
        .mount(&server)
        .await;

    let result = client.fetch_all_devices().await;

    match result {
        Err(HubError::Decode(msg)) => assert!(msg.contains("d1")),
        other => panic!("expected a decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_authentication_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let result = client.fetch_all_devices().await;

    assert!(
        matches!(result, Err(HubError::Authentication { status: 401 })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_server_error_is_status_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let result = client.fetch_all_devices().await;

    assert!(matches!(result, Err(HubError::Status { status: 500, .. })));
}

#[tokio::test]
async fn test_non_json_body_is_decode_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let result = client.fetch_all_devices().await;

    assert!(matches!(result, Err(HubError::Decode(_))));
}

// ── Scenes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_scenes() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/scenes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "s1", "info": {"name": "Movie night", "icon": "scenes_tv"}, "type": "userScene"}
        ])))
        .mount(&server)
        .await;

    let scenes = client.fetch_scenes().await.unwrap();

    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0].info.name, "Movie night");
}

// ── Connectivity ────────────────────────────────────────────────────

#[tokio::test]
async fn test_unreachable_hub() {
    // Nothing listens on port 1.
    let client = HubClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:1/v1/").unwrap(),
        Url::parse("ws://127.0.0.1:1/v1").unwrap(),
        SecretString::from("secret-token".to_string()),
    );

    let result = client.fetch_scenes().await;
    assert!(matches!(result, Err(HubError::Unreachable(_))));

    let result = client.events().await;
    assert!(matches!(result, Err(HubError::Unreachable(_))));
}
