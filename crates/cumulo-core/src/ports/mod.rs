//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`RemoteClient`] - Remote file-store operations (enumerate, transfer,
//!   trash, capabilities), implemented by `cumulo-remote`

pub mod remote_client;

pub use remote_client::{
    Capabilities, EnumerateDepth, FilesCapabilities, RemoteClient, RemoteEntry, RemoteError,
    TrashCapabilities, TrashedEntry, UserProfile,
};
