//! Cumulo server API client
//!
//! Provides a typed HTTP client for the Cumulo server's JSON REST API.
//! Handles authentication headers, JSON deserialization, and endpoint
//! construction.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cumulo_core::domain::RemoteUrl;
//! use cumulo_core::ports::{EnumerateDepth, RemoteClient};
//! use cumulo_remote::ApiClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ApiClient::new("https://cloud.example.com", "access-token");
//! let url = RemoteUrl::new("https://cloud.example.com/files/alice")?;
//! let entries = client
//!     .enumerate(&url, EnumerateDepth::Children, true)
//!     .await?;
//! println!("{} entries", entries.len());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use cumulo_core::domain::{Etag, RemoteUrl};
use cumulo_core::ports::{
    Capabilities, EnumerateDepth, RemoteClient, RemoteEntry, RemoteError, TrashedEntry,
    UserProfile,
};

/// Path prefix of the versioned REST API
const API_PREFIX: &str = "/api/v1";

// ============================================================================
// Task observation
// ============================================================================

/// Event reported to the host for transfer tracking
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A request has been handed to the transport
    Started {
        request_id: u64,
        operation: &'static str,
    },
    /// The request completed (successfully or not)
    Finished { request_id: u64, success: bool },
}

/// Host callback invoked on request start/finish
///
/// Installed once on the client rather than passed per call, keeping the
/// `RemoteClient` trait object-safe and the call sites uncluttered.
pub type TaskObserver = Arc<dyn Fn(TaskEvent) + Send + Sync>;

// ============================================================================
// API response types
// ============================================================================

/// Response of the list and trash endpoints
#[derive(Debug, Deserialize)]
struct ListResponse {
    entries: Vec<RemoteEntry>,
}

#[derive(Debug, Deserialize)]
struct TrashListResponse {
    entries: Vec<TrashedEntry>,
}

/// Response of the chunked-session create endpoint
#[derive(Debug, Deserialize)]
struct SessionResponse {
    session: String,
}

// ============================================================================
// ApiClient
// ============================================================================

/// HTTP client for the Cumulo server API
///
/// Wraps `reqwest::Client` with bearer authentication and endpoint
/// construction. The base URL is configurable so tests can point the
/// client at a mock server.
pub struct ApiClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests (scheme + host)
    base_url: String,
    /// Current bearer access token
    access_token: String,
    /// Optional host transfer-tracking callback
    observer: Option<TaskObserver>,
    /// Monotonic request counter feeding [`TaskEvent`] ids
    request_counter: AtomicU64,
}

impl ApiClient {
    /// Creates a new ApiClient for the server at `base_url`
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: Client::new(),
            base_url,
            access_token: access_token.into(),
            observer: None,
            request_counter: AtomicU64::new(0),
        }
    }

    /// Installs a host transfer-tracking observer
    pub fn with_observer(mut self, observer: TaskObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Updates the access token (e.g. after a token refresh)
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.access_token = token.into();
        debug!("Updated ApiClient access token");
    }

    /// Creates an authenticated request builder for the given method and
    /// API path (relative to the versioned prefix)
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
    }

    /// Sends a request, reporting task events and mapping transport
    /// failures to [`RemoteError::Unavailable`]
    async fn send(
        &self,
        builder: RequestBuilder,
        operation: &'static str,
    ) -> Result<Response, RemoteError> {
        let request_id = self.request_counter.fetch_add(1, Ordering::Relaxed);
        if let Some(observer) = &self.observer {
            observer(TaskEvent::Started {
                request_id,
                operation,
            });
        }

        let result = builder
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()));

        if let Some(observer) = &self.observer {
            observer(TaskEvent::Finished {
                request_id,
                success: matches!(&result, Ok(r) if r.status().is_success()),
            });
        }
        result
    }

    /// Maps a non-success HTTP status to the structured error taxonomy
    fn map_status(status: StatusCode) -> RemoteError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
            StatusCode::NOT_FOUND => RemoteError::NotFound,
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => RemoteError::Collision,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                RemoteError::Unsupported
            }
            other => RemoteError::Http(other.as_u16()),
        }
    }

    /// Checks the response status, consuming error bodies
    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if !body.is_empty() {
            warn!(status = %status, body = %body, "Server reported an error");
        }
        Err(Self::map_status(status))
    }

    /// Decodes a JSON body, mapping failures to `InvalidResponse`
    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl RemoteClient for ApiClient {
    async fn enumerate(
        &self,
        url: &RemoteUrl,
        depth: EnumerateDepth,
        include_hidden: bool,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        debug!(url = %url, depth = depth.as_str(), "Enumerating");

        let builder = self
            .request(Method::GET, "/list")
            .query(&[
                ("url", url.as_str()),
                ("depth", depth.as_str()),
                ("hidden", if include_hidden { "true" } else { "false" }),
            ]);
        let response = Self::check(self.send(builder, "enumerate").await?).await?;
        let list: ListResponse = Self::decode(response).await?;

        if list.entries.is_empty() {
            return Err(RemoteError::InvalidResponse(
                "listing without the target's own entry".to_string(),
            ));
        }
        Ok(list.entries)
    }

    async fn create_folder(&self, url: &RemoteUrl) -> Result<RemoteEntry, RemoteError> {
        debug!(url = %url, "Creating folder");

        let builder = self
            .request(Method::POST, "/folders")
            .json(&serde_json::json!({ "url": url.as_str() }));
        let response = Self::check(self.send(builder, "create_folder").await?).await?;
        Self::decode(response).await
    }

    async fn move_item(
        &self,
        source: &RemoteUrl,
        destination: &RemoteUrl,
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        debug!(source = %source, destination = %destination, "Moving item");

        let builder = self.request(Method::POST, "/move").json(&serde_json::json!({
            "source": source.as_str(),
            "destination": destination.as_str(),
            "overwrite": overwrite,
        }));
        Self::check(self.send(builder, "move_item").await?).await?;
        Ok(())
    }

    async fn delete(&self, url: &RemoteUrl) -> Result<(), RemoteError> {
        debug!(url = %url, "Deleting item");

        let builder = self
            .request(Method::POST, "/delete")
            .json(&serde_json::json!({ "url": url.as_str() }));
        Self::check(self.send(builder, "delete").await?).await?;
        Ok(())
    }

    async fn download(&self, url: &RemoteUrl) -> Result<Vec<u8>, RemoteError> {
        debug!(url = %url, "Downloading");

        let builder = self
            .request(Method::GET, "/download")
            .query(&[("url", url.as_str())]);
        let response = Self::check(self.send(builder, "download").await?).await?;

        let mut data = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RemoteError::Unavailable(e.to_string()))?;
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    async fn upload(
        &self,
        url: &RemoteUrl,
        data: Vec<u8>,
        if_match: Option<&Etag>,
    ) -> Result<RemoteEntry, RemoteError> {
        debug!(url = %url, bytes = data.len(), "Uploading");

        let mut builder = self
            .request(Method::PUT, "/upload")
            .query(&[("url", url.as_str())])
            .body(data);
        if let Some(etag) = if_match {
            builder = builder.header("If-Match", etag.as_str());
        }
        let response = Self::check(self.send(builder, "upload").await?).await?;
        Self::decode(response).await
    }

    async fn chunked_upload(
        &self,
        url: &RemoteUrl,
        data: Vec<u8>,
        chunk_size: usize,
    ) -> Result<RemoteEntry, RemoteError> {
        if chunk_size == 0 {
            return Err(RemoteError::InvalidResponse(
                "chunk size must be non-zero".to_string(),
            ));
        }
        debug!(url = %url, bytes = data.len(), chunk_size, "Starting chunked upload");

        let builder = self
            .request(Method::POST, "/uploads")
            .json(&serde_json::json!({ "url": url.as_str(), "size": data.len() }));
        let response = Self::check(self.send(builder, "chunked_upload").await?).await?;
        let session: SessionResponse = Self::decode(response).await?;

        for (index, chunk) in data.chunks(chunk_size).enumerate() {
            let path = format!("/uploads/{}/{}", session.session, index);
            let builder = self.request(Method::PUT, &path).body(chunk.to_vec());
            Self::check(self.send(builder, "chunked_upload").await?).await?;
        }

        let path = format!("/uploads/{}/commit", session.session);
        let builder = self.request(Method::POST, &path);
        let response = Self::check(self.send(builder, "chunked_upload").await?).await?;
        Self::decode(response).await
    }

    async fn trashed_items(&self) -> Result<Vec<TrashedEntry>, RemoteError> {
        debug!("Listing trash bin");

        let builder = self.request(Method::GET, "/trash");
        let response = Self::check(self.send(builder, "trashed_items").await?).await?;
        let list: TrashListResponse = Self::decode(response).await?;
        Ok(list.entries)
    }

    async fn restore_from_trash(
        &self,
        trashed: &RemoteUrl,
        target: &RemoteUrl,
    ) -> Result<(), RemoteError> {
        debug!(trashed = %trashed, target = %target, "Restoring from trash");

        let builder = self
            .request(Method::POST, "/trash/restore")
            .json(&serde_json::json!({
                "trashed": trashed.as_str(),
                "target": target.as_str(),
            }));
        Self::check(self.send(builder, "restore_from_trash").await?).await?;
        Ok(())
    }

    async fn capabilities(&self) -> Result<Capabilities, RemoteError> {
        debug!("Fetching capabilities");

        let builder = self.request(Method::GET, "/capabilities");
        let response = Self::check(self.send(builder, "capabilities").await?).await?;
        Self::decode(response).await
    }

    async fn user_profile(&self) -> Result<UserProfile, RemoteError> {
        debug!("Fetching user profile");

        let builder = self.request(Method::GET, "/user");
        let response = Self::check(self.send(builder, "user_profile").await?).await?;
        Self::decode(response).await
    }
}
