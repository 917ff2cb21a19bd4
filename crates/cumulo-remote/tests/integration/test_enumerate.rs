//! Enumeration endpoint tests

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use cumulo_core::domain::RemoteUrl;
use cumulo_core::ports::{EnumerateDepth, RemoteClient, RemoteError};

use crate::common::{entry_json, setup_api_mock};

#[tokio::test]
async fn test_enumerate_children_returns_target_first() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/list"))
        .and(query_param(
            "url",
            "https://cloud.example.com/files/alice/docs",
        ))
        .and(query_param("depth", "1"))
        .and(query_param("hidden", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [
                entry_json("id-docs", "https://cloud.example.com/files/alice/docs", true, "d1"),
                entry_json("id-a", "https://cloud.example.com/files/alice/docs/a.txt", false, "1"),
                entry_json("id-b", "https://cloud.example.com/files/alice/docs/b.txt", false, "1"),
            ]
        })))
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/docs").unwrap();
    let entries = client
        .enumerate(&url, EnumerateDepth::Children, true)
        .await
        .unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].id, "id-docs");
    assert!(entries[0].directory);
    assert_eq!(entries[1].id, "id-a");
    assert_eq!(entries[1].size, 42);
}

#[tokio::test]
async fn test_enumerate_passes_depth_infinity() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/list"))
        .and(query_param("depth", "infinity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [
                entry_json("id-docs", "https://cloud.example.com/files/alice/docs", true, "d1"),
            ]
        })))
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/docs").unwrap();
    let entries = client
        .enumerate(&url, EnumerateDepth::Infinity, false)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_enumerate_missing_directory_maps_to_not_found() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/list"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/gone").unwrap();
    let err = client
        .enumerate(&url, EnumerateDepth::Children, true)
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::NotFound);
}

#[tokio::test]
async fn test_enumerate_rejects_empty_listing() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/list"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "entries": [] })),
        )
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/docs").unwrap();
    let err = client
        .enumerate(&url, EnumerateDepth::Target, true)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
}
