//! Cumulo Store - Item metadata persistence
//!
//! SQLite-based metadata store for:
//! - Item records (the canonical description of each remote item)
//! - Directory-listing reconciliation (the create/update/delete engine)
//! - Chunked-upload session bookkeeping
//!
//! ## Architecture
//!
//! This crate is a driven (secondary) adapter in the hexagonal
//! architecture: it persists `cumulo_core::domain::ItemRecord` values and
//! implements the reconciliation algorithm over them. Reads hand out owned
//! snapshot copies; writes go through SQLite transactions, which are the
//! atomicity boundary of the whole sync core.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with embedded schema migration
//! - [`ItemStore`] - Point lookups, subtree scans, cascading rename,
//!   status transitions, reconciliation, change-feed queries
//! - [`StoreRegistry`] - Per-account store instances with legacy
//!   single-database consolidation
//! - [`StoreError`] - Error types for store operations

pub mod pool;
pub mod reconcile;
pub mod registry;
pub mod store;

pub use pool::DatabasePool;
pub use reconcile::ReconcileOutcome;
pub use registry::StoreRegistry;
pub use store::{ChunkSpan, ItemStore, PendingChanges};

use cumulo_core::domain::DomainError;

/// Errors that can occur during store operations
///
/// Query and transaction failures are transient from the caller's point
/// of view: the operation that hit them may be retried wholesale.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query or transaction failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Conversion between a database row and a domain value failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A domain-level validation error surfaced while mapping rows
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}
