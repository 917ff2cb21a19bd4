//! Capabilities and user-profile endpoint tests

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use cumulo_core::ports::{RemoteClient, RemoteError};

use crate::common::setup_api_mock;

#[tokio::test]
async fn test_capabilities_with_undelete() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/capabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": { "chunked_upload": true, "locking": true },
            "trashbin": { "undelete": true }
        })))
        .mount(&server)
        .await;

    let caps = client.capabilities().await.unwrap();
    assert!(caps.files.chunked_upload);
    assert!(caps.supports_trash());
}

#[tokio::test]
async fn test_capabilities_missing_trashbin_fails_closed() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/capabilities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": { "chunked_upload": false, "locking": false }
        })))
        .mount(&server)
        .await;

    let caps = client.capabilities().await.unwrap();
    assert!(!caps.supports_trash());
}

#[tokio::test]
async fn test_capabilities_unauthorized() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/capabilities"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert_eq!(
        client.capabilities().await.unwrap_err(),
        RemoteError::Unauthorized
    );
}

#[tokio::test]
async fn test_user_profile() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user_id": "alice",
            "display_name": "Alice Example",
            "email": "alice@example.com",
            "quota_used": 1073741824u64,
            "quota_total": 5368709120u64
        })))
        .mount(&server)
        .await;

    let profile = client.user_profile().await.unwrap();
    assert_eq!(profile.user_id, "alice");
    assert_eq!(profile.display_name, "Alice Example");
    assert_eq!(profile.quota_total, 5368709120);
}

#[tokio::test]
async fn test_invalid_payload_maps_to_invalid_response() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client.user_profile().await.unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
}
