//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and malformed identifiers.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote URL format or content
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Invalid item identifier
    #[error("Invalid item id: {0}")]
    InvalidItemId(String),

    /// Invalid remote file identifier
    #[error("Invalid file id: {0}")]
    InvalidFileId(String),

    /// Invalid entity tag
    #[error("Invalid etag: {0}")]
    InvalidEtag(String),

    /// Invalid item status string
    #[error("Invalid item status: {0}")]
    InvalidStatus(String),

    /// UUID parsing error
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
