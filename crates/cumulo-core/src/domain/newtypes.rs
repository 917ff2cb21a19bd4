//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and
//! values. Each newtype ensures data validity at construction time.
//!
//! The item id (`ItemId`) is the identity of a remote object: it is opaque,
//! server-assigned, and stable across rename, move, and trash. Paths are
//! mutable; ids are not.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Server-assigned identifiers
// ============================================================================

/// Opaque, globally unique identifier of a remote item
///
/// Assigned by the server when the item is first created and preserved
/// through every rename, move, trash, and restore. All local bookkeeping
/// is keyed by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create a validated ItemId
    ///
    /// # Errors
    /// Returns `DomainError::InvalidItemId` if the id is empty or contains
    /// whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidItemId(id));
        }
        Ok(Self(id))
    }

    /// Get the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Server-side file identifier
///
/// A secondary identifier some endpoints report instead of the item id
/// (notably the trash listing). Matching trashed entries back to local
/// records must consult both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Create a validated FileId
    ///
    /// # Errors
    /// Returns `DomainError::InvalidFileId` if the id is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidFileId(id));
        }
        Ok(Self(id))
    }

    /// Get the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Opaque remote version token
///
/// A change in etag implies the remote content or metadata changed; the
/// value itself carries no structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Etag(String);

impl Etag {
    /// Create a validated Etag
    ///
    /// # Errors
    /// Returns `DomainError::InvalidEtag` if the token is empty.
    pub fn new(etag: impl Into<String>) -> Result<Self, DomainError> {
        let etag = etag.into();
        if etag.is_empty() {
            return Err(DomainError::InvalidEtag(etag));
        }
        Ok(Self(etag))
    }

    /// Get the etag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Etag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Etag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Locally generated identifiers
// ============================================================================

/// Identifier of an in-progress chunked-upload session
///
/// Generated locally when a record enters the uploading status and cleared
/// when the upload settles back to normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadSessionId(Uuid);

impl UploadSessionId {
    /// Create a new random session id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a session id from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UploadSessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UploadSessionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidSessionId(format!("Invalid UUID: {e}")))
    }
}

// ============================================================================
// Remote URLs
// ============================================================================

/// Absolute URL of a remote item or directory
///
/// Stored without a trailing slash so that string operations (parent/name
/// splitting, subtree prefix tests, prefix rewriting on rename) are exact.
/// The URL is treated as an opaque hierarchical path; no percent decoding
/// is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteUrl(String);

impl RemoteUrl {
    /// Create a validated RemoteUrl
    ///
    /// The value must be an absolute `http://` or `https://` URL with a
    /// non-empty host. Trailing slashes are stripped. Path segments may
    /// contain anything but control characters (file names with spaces
    /// are legal).
    ///
    /// # Errors
    /// Returns `DomainError::InvalidUrl` for anything else.
    pub fn new(url: impl Into<String>) -> Result<Self, DomainError> {
        let mut url = url.into();
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .ok_or_else(|| DomainError::InvalidUrl(url.clone()))?;
        if rest.is_empty() || rest.starts_with('/') || url.chars().any(char::is_control) {
            return Err(DomainError::InvalidUrl(url));
        }
        while url.ends_with('/') {
            url.pop();
        }
        Ok(Self(url))
    }

    /// Get the URL as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host portion of the URL (without scheme, port included)
    #[must_use]
    pub fn host(&self) -> &str {
        let rest = self
            .0
            .strip_prefix("https://")
            .or_else(|| self.0.strip_prefix("http://"))
            .unwrap_or(&self.0);
        rest.split('/').next().unwrap_or(rest)
    }

    /// Append a single path segment
    ///
    /// # Errors
    /// Returns `DomainError::InvalidUrl` if the segment is empty or
    /// contains a slash.
    pub fn join(&self, segment: &str) -> Result<Self, DomainError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(DomainError::InvalidUrl(format!(
                "{}/<{segment}>",
                self.0
            )));
        }
        Ok(Self(format!("{}/{}", self.0, segment)))
    }

    /// Split into parent URL and final segment
    ///
    /// Returns `None` when the URL has no path below the host (nothing to
    /// split off).
    #[must_use]
    pub fn parent_and_name(&self) -> Option<(Self, String)> {
        let scheme_end = self.0.find("://").map(|i| i + 3)?;
        let slash = self.0[scheme_end..].rfind('/')? + scheme_end;
        let parent = &self.0[..slash];
        let name = &self.0[slash + 1..];
        if name.is_empty() {
            return None;
        }
        Some((Self(parent.to_string()), name.to_string()))
    }

    /// True if `other` lies strictly below this URL in the hierarchy
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.0.len() > self.0.len() + 1
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Rewrite this URL from one subtree prefix to another
    ///
    /// Returns `None` if this URL is neither `old` itself nor below it.
    /// Used by cascading directory renames, where every descendant path
    /// must move from the old subtree to the new one.
    #[must_use]
    pub fn rebase(&self, old: &Self, new: &Self) -> Option<Self> {
        if self == old {
            return Some(new.clone());
        }
        if old.is_ancestor_of(self) {
            let suffix = &self.0[old.0.len()..];
            return Some(Self(format!("{}{}", new.0, suffix)));
        }
        None
    }
}

impl Display for RemoteUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteUrl {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_valid() {
        let id = ItemId::new("00042-abcdef").unwrap();
        assert_eq!(id.as_str(), "00042-abcdef");
        assert_eq!(id.to_string(), "00042-abcdef");
    }

    #[test]
    fn test_item_id_rejects_empty_and_whitespace() {
        assert!(ItemId::new("").is_err());
        assert!(ItemId::new("with space").is_err());
    }

    #[test]
    fn test_etag_rejects_empty() {
        assert!(Etag::new("").is_err());
        assert!(Etag::new("65a1b2c3").is_ok());
    }

    #[test]
    fn test_upload_session_id_roundtrip() {
        let id = UploadSessionId::new();
        let parsed = UploadSessionId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_remote_url_validation() {
        assert!(RemoteUrl::new("https://cloud.example.com/files/alice").is_ok());
        assert!(RemoteUrl::new("https://host/My Report.odt").is_ok());
        assert!(RemoteUrl::new("ftp://cloud.example.com").is_err());
        assert!(RemoteUrl::new("https://").is_err());
        assert!(RemoteUrl::new("https://host/a\nb").is_err());
    }

    #[test]
    fn test_remote_url_strips_trailing_slash() {
        let url = RemoteUrl::new("https://cloud.example.com/files/").unwrap();
        assert_eq!(url.as_str(), "https://cloud.example.com/files");
    }

    #[test]
    fn test_remote_url_host() {
        let url = RemoteUrl::new("https://cloud.example.com:8443/files/alice").unwrap();
        assert_eq!(url.host(), "cloud.example.com:8443");
    }

    #[test]
    fn test_remote_url_join_and_split() {
        let base = RemoteUrl::new("https://cloud.example.com/files/alice").unwrap();
        let child = base.join("report.odt").unwrap();
        assert_eq!(
            child.as_str(),
            "https://cloud.example.com/files/alice/report.odt"
        );

        let (parent, name) = child.parent_and_name().unwrap();
        assert_eq!(parent, base);
        assert_eq!(name, "report.odt");
    }

    #[test]
    fn test_remote_url_join_rejects_slash() {
        let base = RemoteUrl::new("https://cloud.example.com/files").unwrap();
        assert!(base.join("a/b").is_err());
        assert!(base.join("").is_err());
    }

    #[test]
    fn test_remote_url_ancestry() {
        let root = RemoteUrl::new("https://h.example/files/alice").unwrap();
        let deep = RemoteUrl::new("https://h.example/files/alice/docs/a.txt").unwrap();
        let sibling = RemoteUrl::new("https://h.example/files/alice2").unwrap();

        assert!(root.is_ancestor_of(&deep));
        assert!(!root.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&sibling));
    }

    #[test]
    fn test_remote_url_rebase() {
        let old = RemoteUrl::new("https://h.example/files/alice/docs").unwrap();
        let new = RemoteUrl::new("https://h.example/files/alice/papers").unwrap();
        let child = RemoteUrl::new("https://h.example/files/alice/docs/deep/a.txt").unwrap();

        let moved = child.rebase(&old, &new).unwrap();
        assert_eq!(
            moved.as_str(),
            "https://h.example/files/alice/papers/deep/a.txt"
        );

        assert_eq!(old.rebase(&old, &new).unwrap(), new);

        let outside = RemoteUrl::new("https://h.example/files/alice/music").unwrap();
        assert!(outside.rebase(&old, &new).is_none());
    }
}
