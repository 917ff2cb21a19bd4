//! Cumulo Sync - Item lifecycle workflows
//!
//! Higher-level, multi-step workflows built on the metadata store and the
//! remote port:
//!
//! - [`ItemOperations`] - move / trash / restore / modify state machines,
//!   each with compensating behavior on partial failure
//! - [`CapabilityCache`] - process-wide, time-bounded cache of server
//!   capability flags with single-flight fetch coalescing per account
//! - [`feed`] - change-feed projection and presentable-item conversion
//!   for the host file provider
//!
//! ## Concurrency Model
//!
//! Multiple independent workflows execute concurrently against the shared,
//! transactionally-isolated store; no global lock serializes unrelated
//! items. Concurrent operations on the SAME item are not mutually
//! exclusive here; the record `status` checks are best-effort guards, not
//! true locks. Cancelled host requests simply abandon their await; store
//! state remains as of the last completed transaction.

pub mod capabilities;
pub mod error;
pub mod feed;
pub mod lifecycle;
pub mod modify;

pub use capabilities::CapabilityCache;
pub use error::OperationError;
pub use feed::{ChangeFeed, PresentableItem};
pub use lifecycle::ItemOperations;
pub use modify::ModifyRequest;
