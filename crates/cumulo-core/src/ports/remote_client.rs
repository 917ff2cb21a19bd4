//! Remote file-store port (driven/secondary port)
//!
//! This module defines the interface for talking to the Cumulo server.
//! The primary implementation lives in `cumulo-remote`, but the trait is
//! deliberately transport-agnostic so tests can substitute an in-process
//! mock.
//!
//! ## Design Notes
//!
//! - Every method returns a structured [`RemoteError`] rather than an
//!   opaque error, because lifecycle workflows branch on the failure kind
//!   (collision vs not-found vs unsupported).
//! - [`RemoteEntry`] is a port-level DTO, not a domain entity; it knows
//!   how to map itself into an [`ItemRecord`] for a given account.
//! - Retry/backoff for individual calls is NOT this layer's job: one
//!   attempt, structured error out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::account::Account;
use crate::domain::item::{ItemRecord, ItemStatus, LockState, TrashState};
use crate::domain::newtypes::{Etag, FileId, ItemId, RemoteUrl};
use crate::domain::DomainError;

// ============================================================================
// RemoteError
// ============================================================================

/// Structured failure reported by the remote file store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Credentials rejected or expired
    #[error("Unauthorized")]
    Unauthorized,

    /// The addressed item does not exist on the server
    #[error("Remote item not found")]
    NotFound,

    /// The destination already exists (move/upload/create collision)
    #[error("Remote collision: destination already exists")]
    Collision,

    /// The server does not offer the requested feature
    #[error("Feature not supported by server")]
    Unsupported,

    /// The server answered, but the payload could not be understood
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// The server could not be reached
    #[error("Server unreachable: {0}")]
    Unavailable(String),

    /// Any other HTTP failure status
    #[error("Unexpected HTTP status {0}")]
    Http(u16),
}

// ============================================================================
// Wire DTOs
// ============================================================================

/// Enumeration depth for directory listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerateDepth {
    /// Only the addressed item itself
    Target,
    /// The addressed item plus its direct children
    Children,
    /// The full subtree below the addressed item
    Infinity,
}

impl EnumerateDepth {
    /// Wire value used by the enumeration endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            EnumerateDepth::Target => "0",
            EnumerateDepth::Children => "1",
            EnumerateDepth::Infinity => "infinity",
        }
    }
}

/// One entry of a remote directory listing
///
/// Raw server data; mapped into [`ItemRecord`] via [`RemoteEntry::into_record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Stable object id
    pub id: String,
    /// Secondary file id
    pub file_id: String,
    /// Full URL of the entry
    pub url: String,
    /// Display name, when it differs from the URL's final segment
    pub display_name: Option<String>,
    /// Whether the entry is a directory
    pub directory: bool,
    /// Version token
    pub etag: String,
    /// MIME type (empty for directories)
    #[serde(default)]
    pub content_type: String,
    /// Size in bytes
    #[serde(default)]
    pub size: i64,
    /// Creation timestamp
    pub created_at: Option<DateTime<Utc>>,
    /// Modification timestamp
    pub modified_at: Option<DateTime<Utc>>,
    /// Server permission string
    #[serde(default)]
    pub permissions: String,
    /// Whether the entry is end-to-end encrypted
    #[serde(default)]
    pub e2e_encrypted: bool,
    /// Lock metadata, if the server reports the entry locked
    pub lock: Option<LockState>,
}

impl RemoteEntry {
    /// Maps this wire entry into a fresh [`ItemRecord`] for `account`
    ///
    /// The record starts life as remote truth: status `Normal`,
    /// `uploaded = true`, `downloaded = false`, `sync_time = now`.
    ///
    /// # Errors
    /// Returns `DomainError` when the entry carries malformed ids or an
    /// URL that cannot be split into parent and name.
    pub fn into_record(&self, account: &Account) -> Result<ItemRecord, DomainError> {
        let url = RemoteUrl::new(self.url.clone())?;
        let (server_url, file_name) = url
            .parent_and_name()
            .ok_or_else(|| DomainError::InvalidUrl(self.url.clone()))?;
        Ok(ItemRecord {
            item_id: ItemId::new(self.id.clone())?,
            account: account.id(),
            base_url: account.base_url().clone(),
            server_url,
            file_name_view: self
                .display_name
                .clone()
                .unwrap_or_else(|| file_name.clone()),
            file_name,
            directory: self.directory,
            file_id: FileId::new(self.file_id.clone())?,
            etag: Etag::new(self.etag.clone())?,
            content_type: self.content_type.clone(),
            size: self.size,
            created_at: self.created_at,
            modified_at: self.modified_at,
            permissions: self.permissions.clone(),
            e2e_encrypted: self.e2e_encrypted,
            status: ItemStatus::Normal,
            downloaded: false,
            uploaded: true,
            lock: self.lock.clone(),
            trash: None,
            sync_time: Utc::now(),
            deleted: false,
            visited_directory: false,
            keep_downloaded: false,
            chunk_upload_id: None,
        })
    }
}

/// One entry of the trash-bin listing
///
/// The server may rename an item on trash and may report the secondary
/// file id in place of the object id; consumers must match local records
/// against BOTH identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashedEntry {
    /// Object id, when the server preserves it
    pub id: Option<String>,
    /// Secondary file id
    pub file_id: String,
    /// Full URL of the entry inside the trash bin
    pub url: String,
    /// Current (possibly server-assigned) name in the trash
    pub name: String,
    /// Pre-trash location, relative to the files root
    pub original_location: String,
    /// Whether the entry is a directory
    pub directory: bool,
    /// When the server trashed the entry
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TrashedEntry {
    /// True if this trashed entry corresponds to the given local record
    pub fn matches(&self, item_id: &ItemId, file_id: &FileId) -> bool {
        if let Some(id) = &self.id {
            if id == item_id.as_str() {
                return true;
            }
        }
        self.file_id == file_id.as_str() || self.file_id == item_id.as_str()
    }

    /// Applies this trashed entry's identity onto a local record
    ///
    /// The object id is preserved; path fields move under the trash root
    /// and the trash metadata captures the original location.
    ///
    /// # Errors
    /// Returns `DomainError` when the trashed URL is malformed.
    pub fn adopt_into(&self, record: &mut ItemRecord) -> Result<(), DomainError> {
        let url = RemoteUrl::new(self.url.clone())?;
        let (server_url, file_name) = url
            .parent_and_name()
            .ok_or_else(|| DomainError::InvalidUrl(self.url.clone()))?;
        record.server_url = server_url;
        record.file_name = file_name;
        record.file_name_view = self.name.clone();
        record.trash = Some(TrashState {
            original_location: self.original_location.clone(),
            deleted_at: self.deleted_at,
        });
        record.sync_time = Utc::now();
        Ok(())
    }
}

/// Parsed server capability flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Core file-handling capabilities
    #[serde(default)]
    pub files: FilesCapabilities,
    /// Trash-bin capabilities; absent when the server has no trash app
    pub trashbin: Option<TrashCapabilities>,
}

impl Capabilities {
    /// Whether trashing (and undelete) is available
    ///
    /// Fails closed: a missing trashbin section means no trash support.
    pub fn supports_trash(&self) -> bool {
        self.trashbin.as_ref().is_some_and(|t| t.undelete)
    }
}

/// File-handling capability flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesCapabilities {
    /// Server accepts chunked upload sessions
    #[serde(default)]
    pub chunked_upload: bool,
    /// Server supports collaborative file locking
    #[serde(default)]
    pub locking: bool,
}

/// Trash-bin capability flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashCapabilities {
    /// Trashed items can be restored
    #[serde(default)]
    pub undelete: bool,
}

/// Profile of the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Server login name
    pub user_id: String,
    /// Display name
    pub display_name: String,
    /// Contact email, when the server exposes one
    pub email: Option<String>,
    /// Storage quota used in bytes
    pub quota_used: u64,
    /// Total storage quota in bytes
    pub quota_total: u64,
}

// ============================================================================
// RemoteClient trait
// ============================================================================

/// Port trait for remote file-store operations
///
/// All interactions with the Cumulo server go through this interface.
/// Implementations handle transport specifics and map HTTP failures into
/// [`RemoteError`]; they do NOT retry (per-call retry policy belongs to
/// outer layers).
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Lists the item at `url` and, depending on `depth`, its children
    /// or full subtree
    ///
    /// The addressed item's own entry is always first in the returned
    /// vector; children follow. When `include_hidden` is false the server
    /// omits dot-files.
    async fn enumerate(
        &self,
        url: &RemoteUrl,
        depth: EnumerateDepth,
        include_hidden: bool,
    ) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Creates a directory at `url` and returns its fresh entry
    async fn create_folder(&self, url: &RemoteUrl) -> Result<RemoteEntry, RemoteError>;

    /// Moves or renames `source` to `destination`
    async fn move_item(
        &self,
        source: &RemoteUrl,
        destination: &RemoteUrl,
        overwrite: bool,
    ) -> Result<(), RemoteError>;

    /// Deletes the item at `url`
    ///
    /// On servers with trash support this moves the item into the trash
    /// bin rather than destroying it.
    async fn delete(&self, url: &RemoteUrl) -> Result<(), RemoteError>;

    /// Downloads the file content at `url`
    async fn download(&self, url: &RemoteUrl) -> Result<Vec<u8>, RemoteError>;

    /// Uploads `data` to `url` in a single request
    ///
    /// When `if_match` is given the upload only succeeds if the remote
    /// etag still matches (concurrent-change protection).
    async fn upload(
        &self,
        url: &RemoteUrl,
        data: Vec<u8>,
        if_match: Option<&Etag>,
    ) -> Result<RemoteEntry, RemoteError>;

    /// Uploads `data` to `url` through a chunked session
    ///
    /// Used for payloads above the configured chunking threshold.
    async fn chunked_upload(
        &self,
        url: &RemoteUrl,
        data: Vec<u8>,
        chunk_size: usize,
    ) -> Result<RemoteEntry, RemoteError>;

    /// Lists the full contents of the account's trash bin
    async fn trashed_items(&self) -> Result<Vec<TrashedEntry>, RemoteError>;

    /// Restores a trashed item to `target`
    async fn restore_from_trash(
        &self,
        trashed: &RemoteUrl,
        target: &RemoteUrl,
    ) -> Result<(), RemoteError>;

    /// Fetches the server capability flags
    async fn capabilities(&self) -> Result<Capabilities, RemoteError>;

    /// Fetches the authenticated user's profile
    async fn user_profile(&self) -> Result<UserProfile, RemoteError>;
}
