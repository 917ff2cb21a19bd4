//! Cumulo Remote - HTTP adapter for the Cumulo server API
//!
//! Implements the `RemoteClient` port from `cumulo-core` against the
//! server's JSON REST API. This crate owns transport concerns only:
//! endpoint construction, bearer authentication, payload (de)serialization,
//! and the mapping of HTTP failures onto the structured [`RemoteError`]
//! taxonomy. It performs NO retrying; per-call retry policy belongs to
//! outer layers.
//!
//! ## Key Components
//!
//! - [`ApiClient`] - The `RemoteClient` implementation
//! - [`TaskObserver`] / [`TaskEvent`] - Optional host-level transfer
//!   tracking hooks invoked at request start/finish

pub mod client;

pub use client::{ApiClient, TaskEvent, TaskObserver};
