//! Item metadata record
//!
//! This module defines [`ItemRecord`], the canonical description of one
//! remote-or-local item (file or directory), and [`ItemStatus`], the
//! transfer-ownership state machine bracketing uploads and downloads.
//!
//! ## Status Machine
//!
//! ```text
//!                  download          complete
//!     ┌────────┐ ───────────► ┌─────────────┐ ───────► ┌────────┐
//!     │ Normal │              │ Downloading │          │ Normal │
//!     └────────┘ ◄─────────── └─────────────┘          └────────┘
//!         │         failure → DownloadError
//!         │
//!         │ upload                           complete / failure
//!         └────────► ┌───────────┐ ─────────► Normal / UploadError
//!                    │ Uploading │
//!                    └───────────┘
//! ```
//!
//! Any status other than `Normal` means an in-flight operation owns the
//! record: reconciliation must not overwrite it, and no other writer may
//! silently replace its status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::Account;
use super::errors::DomainError;
use super::newtypes::{Etag, FileId, ItemId, RemoteUrl, UploadSessionId};

// ============================================================================
// ItemStatus
// ============================================================================

/// Transfer-ownership status of an item record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// No in-flight operation; reconciliation may update freely
    #[default]
    Normal,
    /// Content is being fetched from the server
    Downloading,
    /// The last download attempt failed
    DownloadError,
    /// Content is being sent to the server
    Uploading,
    /// The last upload attempt failed
    UploadError,
    /// A delete has been issued but not yet confirmed by the server
    DeleteInTransit,
}

impl ItemStatus {
    /// Returns true if no in-flight operation owns the record
    pub fn is_normal(&self) -> bool {
        matches!(self, ItemStatus::Normal)
    }

    /// Returns true if an in-flight operation owns the record
    pub fn in_transit(&self) -> bool {
        !self.is_normal()
    }

    /// Returns true for the upload-side states
    pub fn is_upload_state(&self) -> bool {
        matches!(self, ItemStatus::Uploading | ItemStatus::UploadError)
    }

    /// Returns true for the download-side states
    pub fn is_download_state(&self) -> bool {
        matches!(self, ItemStatus::Downloading | ItemStatus::DownloadError)
    }

    /// Stable string form used in the persisted store
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Normal => "normal",
            ItemStatus::Downloading => "downloading",
            ItemStatus::DownloadError => "download_error",
            ItemStatus::Uploading => "uploading",
            ItemStatus::UploadError => "upload_error",
            ItemStatus::DeleteInTransit => "delete_in_transit",
        }
    }

    /// Parse the persisted string form
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStatus` for unknown values.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "normal" => Ok(ItemStatus::Normal),
            "downloading" => Ok(ItemStatus::Downloading),
            "download_error" => Ok(ItemStatus::DownloadError),
            "uploading" => Ok(ItemStatus::Uploading),
            "upload_error" => Ok(ItemStatus::UploadError),
            "delete_in_transit" => Ok(ItemStatus::DeleteInTransit),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Lock and trash metadata
// ============================================================================

/// Kind of lock holder reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Interactive user lock
    User,
    /// Collaborative application lock (e.g. an online editor)
    App,
    /// Token-based lock held by an automation
    Token,
}

impl LockKind {
    /// Stable string form used in the persisted store
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::User => "user",
            LockKind::App => "app",
            LockKind::Token => "token",
        }
    }

    /// Parse the persisted string form
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "user" => Ok(LockKind::User),
            "app" => Ok(LockKind::App),
            "token" => Ok(LockKind::Token),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown lock kind: {other}"
            ))),
        }
    }
}

/// Server-side lock metadata attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    /// Display name of the lock holder
    pub owner: String,
    /// Kind of holder
    pub kind: LockKind,
    /// When the lock expires, if the server reports an expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// Trash metadata captured when an item is deleted with trashing semantics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashState {
    /// Pre-trash location, relative to the account's files root
    pub original_location: String,
    /// When the server moved the item to trash
    pub deleted_at: Option<DateTime<Utc>>,
}

// ============================================================================
// ItemRecord
// ============================================================================

/// Canonical metadata record for one remote-or-local item
///
/// Keyed by [`ItemId`], which is stable across rename, move, and trash;
/// every path field is mutable. Records are value types: reads from the
/// store hand out owned copies, so holders act on a snapshot while other
/// writers proceed.
///
/// Records are logically destroyed by setting the `deleted` tombstone,
/// never physically removed by the sync layer itself; tombstones keep
/// retries idempotent and protect children of renames still in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Stable object id, the record's identity
    pub item_id: ItemId,
    /// Owning account identifier (`user@host`)
    pub account: String,
    /// Server base URL of the owning account
    pub base_url: RemoteUrl,
    /// URL of the parent directory
    pub server_url: RemoteUrl,
    /// Real file name on the server (must be a valid path segment)
    pub file_name: String,
    /// Display name shown to the user
    pub file_name_view: String,
    /// Whether this record is a directory
    pub directory: bool,
    /// Secondary server-side file identifier
    pub file_id: FileId,
    /// Remote version token
    pub etag: Etag,
    /// MIME type reported by the server (empty for directories)
    pub content_type: String,
    /// Size in bytes (0 for directories)
    pub size: i64,
    /// Creation timestamp reported by the server
    pub created_at: Option<DateTime<Utc>>,
    /// Modification timestamp reported by the server
    pub modified_at: Option<DateTime<Utc>>,
    /// Server permission string (opaque)
    pub permissions: String,
    /// Whether the item belongs to an end-to-end-encrypted subtree
    pub e2e_encrypted: bool,
    /// Transfer-ownership status
    pub status: ItemStatus,
    /// Whether content is materialized locally
    pub downloaded: bool,
    /// Whether the server has acknowledged this item's content
    pub uploaded: bool,
    /// Server lock metadata, if locked
    pub lock: Option<LockState>,
    /// Trash metadata, if trashed
    pub trash: Option<TrashState>,
    /// Last time reconciliation wrote this record
    pub sync_time: DateTime<Utc>,
    /// Tombstone flag
    pub deleted: bool,
    /// For directories: contents have been listed at least once
    pub visited_directory: bool,
    /// User pin: keep content materialized locally
    pub keep_downloaded: bool,
    /// In-progress chunked-upload session, if any
    pub chunk_upload_id: Option<UploadSessionId>,
}

impl ItemRecord {
    /// Full remote URL of this item (parent URL + file name)
    ///
    /// # Errors
    /// Returns `DomainError::InvalidUrl` if the file name is not a valid
    /// path segment.
    pub fn full_url(&self) -> Result<RemoteUrl, DomainError> {
        self.server_url.join(&self.file_name)
    }

    /// True if this record is the account's home files root itself
    pub fn is_root(&self, account: &Account) -> bool {
        let full = format!("{}/{}", self.server_url, self.file_name);
        full == account.files_url().as_str()
    }

    /// True if this record currently lives in the trash bin
    pub fn is_trashed(&self, account: &Account) -> bool {
        let trash = account.trash_url();
        self.server_url == trash || trash.is_ancestor_of(&self.server_url)
    }

    /// True if the file name marks a transient editor lock file
    ///
    /// Matches LibreOffice (`.~lock.<name>#`) and MS Office (`~$<name>`)
    /// conventions. Such entries are hidden from the host file provider.
    pub fn is_transient_lock_file(&self) -> bool {
        (self.file_name.starts_with(".~lock.") && self.file_name.ends_with('#'))
            || self.file_name.starts_with("~$")
    }

    /// Compares the server-reported fields of `self` against `fresh`
    ///
    /// Returns true when any field the server is authoritative for
    /// differs. Local-only fields (`downloaded`, `uploaded`, `status`,
    /// `sync_time`, `visited_directory`, `keep_downloaded`,
    /// `chunk_upload_id`) never participate.
    pub fn differs_remotely(&self, fresh: &ItemRecord) -> bool {
        self.etag != fresh.etag
            || self.size != fresh.size
            || self.modified_at != fresh.modified_at
            || self.created_at != fresh.created_at
            || self.file_name != fresh.file_name
            || self.file_name_view != fresh.file_name_view
            || self.server_url != fresh.server_url
            || self.content_type != fresh.content_type
            || self.permissions != fresh.permissions
            || self.directory != fresh.directory
            || self.e2e_encrypted != fresh.e2e_encrypted
            || self.lock != fresh.lock
            || self.file_id != fresh.file_id
    }

    /// Merges local-only state from an existing record into this fresh one
    ///
    /// Used when reconciliation turns a fresh remote record into an update
    /// of an existing row. The `keep_download_state` flag preserves the
    /// `downloaded` bit (callers pass true when they know content did not
    /// change); the pin and visited flags are local intent and always
    /// survive.
    pub fn with_local_state(mut self, existing: &ItemRecord, keep_download_state: bool) -> Self {
        self.downloaded = if keep_download_state {
            existing.downloaded
        } else {
            false
        };
        self.keep_downloaded = existing.keep_downloaded;
        self.visited_directory = existing.visited_directory;
        self.status = existing.status;
        self.chunk_upload_id = existing.chunk_upload_id;
        self
    }
}
