//! Operation error taxonomy
//!
//! Each lifecycle workflow maps remote and storage failures onto this
//! enum rather than raising opaque faults, so callers can branch on the
//! failure kind (retry the listing import, trigger a full rescan, or
//! surface a user-facing error).

use thiserror::Error;

use cumulo_core::domain::DomainError;
use cumulo_core::ports::RemoteError;
use cumulo_store::StoreError;

/// Errors surfaced by the item lifecycle workflows
#[derive(Debug, Error)]
pub enum OperationError {
    /// The addressed item is unknown locally or remotely
    #[error("Item not found")]
    NotFound,

    /// The destination already exists (collision)
    #[error("Destination already exists")]
    AlreadyExists,

    /// The server does not offer the required feature
    #[error("Server does not support {0}")]
    Unsupported(&'static str),

    /// Local metadata disagrees with the server; a full rescan of the
    /// affected subtree is required. Distinct from hard failure so
    /// callers can recover without surfacing an error to the user.
    #[error("Out of sync with server, rescan required: {0}")]
    OutOfSync(String),

    /// A record expected to survive the operation vanished mid-flight
    #[error("Item record vanished during operation: {0}")]
    ItemVanished(String),

    /// Local file I/O failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A storage transaction failed (transient, caller may retry)
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// An unmapped remote failure
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// A domain-level validation error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl From<RemoteError> for OperationError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotFound => OperationError::NotFound,
            RemoteError::Collision => OperationError::AlreadyExists,
            other => OperationError::Remote(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_mapping() {
        assert!(matches!(
            OperationError::from(RemoteError::NotFound),
            OperationError::NotFound
        ));
        assert!(matches!(
            OperationError::from(RemoteError::Collision),
            OperationError::AlreadyExists
        ));
        assert!(matches!(
            OperationError::from(RemoteError::Http(500)),
            OperationError::Remote(RemoteError::Http(500))
        ));
    }
}
