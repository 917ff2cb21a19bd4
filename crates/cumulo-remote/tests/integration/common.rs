//! Shared test helpers for API integration tests
//!
//! Provides wiremock-based mock server setup. Each helper mounts the
//! necessary mock endpoints and returns a configured ApiClient pointing at
//! the mock server.

use wiremock::MockServer;

use cumulo_remote::ApiClient;

/// Starts a mock server and returns it with a client pointed at it.
pub async fn setup_api_mock() -> (MockServer, ApiClient) {
    let server = MockServer::start().await;
    let client = ApiClient::new(server.uri(), "test-access-token");
    (server, client)
}

/// JSON body for one listing entry.
pub fn entry_json(id: &str, url: &str, directory: bool, etag: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "file_id": format!("f-{id}"),
        "url": url,
        "directory": directory,
        "etag": etag,
        "content_type": if directory { "" } else { "text/plain" },
        "size": if directory { 0 } else { 42 },
        "modified_at": "2026-07-15T12:00:00Z",
        "permissions": "RGDNVW"
    })
}
