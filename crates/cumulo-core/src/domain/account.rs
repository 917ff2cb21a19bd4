//! Account identity
//!
//! An account couples a server user name with the server base URL. Its
//! derived well-known roots (home files root, trash root) are the sentinel
//! parents used during path-based parent resolution: a record whose
//! `server_url` equals one of these roots has no parent record of its own.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::RemoteUrl;

/// A configured Cumulo account
///
/// Identified by `user@host`, which is stable for the lifetime of the
/// account and keys the per-account metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Server login name
    user: String,
    /// Server base URL (scheme + host, no path)
    base_url: RemoteUrl,
}

impl Account {
    /// Creates a new account for `user` on the server at `base_url`
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if the user name is empty
    /// or contains characters that cannot appear in a URL path segment.
    pub fn new(user: impl Into<String>, base_url: RemoteUrl) -> Result<Self, DomainError> {
        let user = user.into();
        if user.is_empty() || user.contains('/') || user.chars().any(char::is_whitespace) {
            return Err(DomainError::ValidationFailed(format!(
                "invalid account user name: {user:?}"
            )));
        }
        Ok(Self { user, base_url })
    }

    /// Stable account identifier (`user@host`)
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}@{}", self.user, self.base_url.host())
    }

    /// Returns the server login name
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the server base URL
    #[must_use]
    pub fn base_url(&self) -> &RemoteUrl {
        &self.base_url
    }

    /// Root URL of the account's home files tree
    #[must_use]
    pub fn files_url(&self) -> RemoteUrl {
        self.base_url
            .join("files")
            .and_then(|u| u.join(&self.user))
            .expect("account user validated at construction")
    }

    /// Root URL of the account's trash bin
    #[must_use]
    pub fn trash_url(&self) -> RemoteUrl {
        self.base_url
            .join("trash")
            .and_then(|u| u.join(&self.user))
            .expect("account user validated at construction")
    }

    /// True if `url` is the home files root or the trash root
    #[must_use]
    pub fn is_sentinel_root(&self, url: &RemoteUrl) -> bool {
        *url == self.files_url() || *url == self.trash_url()
    }

    /// True if `url` lies inside the trash bin
    #[must_use]
    pub fn is_trashed_url(&self, url: &RemoteUrl) -> bool {
        let trash = self.trash_url();
        *url == trash || trash.is_ancestor_of(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new(
            "alice",
            RemoteUrl::new("https://cloud.example.com").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_user() {
        let base = RemoteUrl::new("https://cloud.example.com").unwrap();
        assert!(Account::new("", base.clone()).is_err());
        assert!(Account::new("a/b", base.clone()).is_err());
        assert!(Account::new("a b", base).is_err());
    }

    #[test]
    fn test_account_id() {
        assert_eq!(account().id(), "alice@cloud.example.com");
    }

    #[test]
    fn test_well_known_roots() {
        let account = account();
        assert_eq!(
            account.files_url().as_str(),
            "https://cloud.example.com/files/alice"
        );
        assert_eq!(
            account.trash_url().as_str(),
            "https://cloud.example.com/trash/alice"
        );
    }

    #[test]
    fn test_sentinel_detection() {
        let account = account();
        assert!(account.is_sentinel_root(&account.files_url()));
        assert!(account.is_sentinel_root(&account.trash_url()));

        let below = account.files_url().join("docs").unwrap();
        assert!(!account.is_sentinel_root(&below));
    }

    #[test]
    fn test_trashed_url_detection() {
        let account = account();
        let trashed = account.trash_url().join("report.odt.d123").unwrap();
        assert!(account.is_trashed_url(&trashed));
        assert!(!account.is_trashed_url(&account.files_url()));
    }
}
