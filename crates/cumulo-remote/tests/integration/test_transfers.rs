//! Upload, download, and chunked-session tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use cumulo_core::domain::{Etag, RemoteUrl};
use cumulo_core::ports::{RemoteClient, RemoteError};
use cumulo_remote::{ApiClient, TaskEvent};

use crate::common::{entry_json, setup_api_mock};

#[tokio::test]
async fn test_download_collects_body() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/download"))
        .and(query_param(
            "url",
            "https://cloud.example.com/files/alice/a.txt",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello cumulo".to_vec()))
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/a.txt").unwrap();
    let data = client.download(&url).await.unwrap();
    assert_eq!(data, b"hello cumulo");
}

#[tokio::test]
async fn test_upload_sends_if_match_and_parses_entry() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/upload"))
        .and(header("If-Match", "e-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry_json(
            "id-a",
            "https://cloud.example.com/files/alice/a.txt",
            false,
            "e-new",
        )))
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/a.txt").unwrap();
    let etag = Etag::new("e-old").unwrap();
    let entry = client
        .upload(&url, b"data".to_vec(), Some(&etag))
        .await
        .unwrap();
    assert_eq!(entry.id, "id-a");
    assert_eq!(entry.etag, "e-new");
}

#[tokio::test]
async fn test_upload_precondition_failure_maps_to_collision() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/upload"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/a.txt").unwrap();
    let err = client.upload(&url, b"x".to_vec(), None).await.unwrap_err();
    assert_eq!(err, RemoteError::Collision);
}

#[tokio::test]
async fn test_chunked_upload_splits_and_commits() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/uploads"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "session": "sess-7" })),
        )
        .mount(&server)
        .await;

    // 100 bytes at chunk size 64 -> chunks 0 and 1.
    Mock::given(method("PUT"))
        .and(path("/api/v1/uploads/sess-7/0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/uploads/sess-7/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/uploads/sess-7/commit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry_json(
            "id-big",
            "https://cloud.example.com/files/alice/big.bin",
            false,
            "e-big",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/big.bin").unwrap();
    let entry = client
        .chunked_upload(&url, vec![0u8; 100], 64)
        .await
        .unwrap();
    assert_eq!(entry.id, "id-big");
}

#[tokio::test]
async fn test_observer_sees_start_and_finish() {
    let (server, _) = setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
        .mount(&server)
        .await;

    let started = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicU64::new(0));
    let (started_c, finished_c) = (Arc::clone(&started), Arc::clone(&finished));

    let client =
        ApiClient::new(server.uri(), "t").with_observer(Arc::new(move |event| match event {
            TaskEvent::Started { .. } => {
                started_c.fetch_add(1, Ordering::SeqCst);
            }
            TaskEvent::Finished { success, .. } => {
                assert!(success);
                finished_c.fetch_add(1, Ordering::SeqCst);
            }
        }));

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/a.txt").unwrap();
    client.download(&url).await.unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}
