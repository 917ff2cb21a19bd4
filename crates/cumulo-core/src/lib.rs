//! Cumulo Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `ItemRecord`, `Account`, `ItemStatus`
//! - **Newtypes** - Validated wrappers for ids, etags, and remote URLs
//! - **Port definitions** - The `RemoteClient` trait consumed by the
//!   synchronization workflows, plus its wire-level DTOs
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external
//! dependencies. Ports define trait interfaces that adapter crates
//! (`cumulo-remote` for HTTP, `cumulo-store` for SQLite) implement or
//! consume. Higher-level workflows live in `cumulo-sync`.

pub mod config;
pub mod domain;
pub mod ports;
