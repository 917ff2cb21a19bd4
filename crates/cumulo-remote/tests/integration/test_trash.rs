//! Trash-bin and move/delete endpoint tests

use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use cumulo_core::domain::RemoteUrl;
use cumulo_core::ports::{RemoteClient, RemoteError};

use crate::common::setup_api_mock;

#[tokio::test]
async fn test_move_posts_source_and_destination() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/move"))
        .and(body_json(serde_json::json!({
            "source": "https://cloud.example.com/files/alice/a.txt",
            "destination": "https://cloud.example.com/files/alice/b.txt",
            "overwrite": false,
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let source = RemoteUrl::new("https://cloud.example.com/files/alice/a.txt").unwrap();
    let destination = RemoteUrl::new("https://cloud.example.com/files/alice/b.txt").unwrap();
    client.move_item(&source, &destination, false).await.unwrap();
}

#[tokio::test]
async fn test_move_conflict_maps_to_collision() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/move"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let source = RemoteUrl::new("https://cloud.example.com/files/alice/a.txt").unwrap();
    let destination = RemoteUrl::new("https://cloud.example.com/files/alice/b.txt").unwrap();
    let err = client
        .move_item(&source, &destination, false)
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::Collision);
}

#[tokio::test]
async fn test_delete_missing_item_maps_to_not_found() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/delete"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = RemoteUrl::new("https://cloud.example.com/files/alice/gone.txt").unwrap();
    assert_eq!(client.delete(&url).await.unwrap_err(), RemoteError::NotFound);
}

#[tokio::test]
async fn test_trash_listing_parses_renamed_entries() {
    let (server, client) = setup_api_mock().await;

    // The server renamed the item on trash and substituted the file id.
    Mock::given(method("GET"))
        .and(path("/api/v1/trash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "entries": [{
                "id": null,
                "file_id": "id-a",
                "url": "https://cloud.example.com/trash/alice/a.txt.d1234",
                "name": "a.txt.d1234",
                "original_location": "docs/a.txt",
                "directory": false,
                "deleted_at": "2026-07-15T12:00:00Z"
            }]
        })))
        .mount(&server)
        .await;

    let entries = client.trashed_items().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, None);
    assert_eq!(entries[0].file_id, "id-a");
    assert_eq!(entries[0].original_location, "docs/a.txt");
}

#[tokio::test]
async fn test_restore_posts_trashed_and_target() {
    let (server, client) = setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/trash/restore"))
        .and(body_json(serde_json::json!({
            "trashed": "https://cloud.example.com/trash/alice/a.txt.d1234",
            "target": "https://cloud.example.com/files/alice/docs/a.txt",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let trashed = RemoteUrl::new("https://cloud.example.com/trash/alice/a.txt.d1234").unwrap();
    let target = RemoteUrl::new("https://cloud.example.com/files/alice/docs/a.txt").unwrap();
    client.restore_from_trash(&trashed, &target).await.unwrap();
}
