//! # tryst-store
//!
//! Watch-list persistence for the Tryst server.
//!
//! The watch relation ("owner watches target") outlives any single
//! session, so the server consumes it through the [`WatchListStore`]
//! interface rather than keeping its own copy. Two backends ship with
//! the crate: an in-memory store for tests and storage-less deployments,
//! and a SQLite store for servers that persist across restarts.

pub mod memory;
pub mod migrations;
pub mod provider;
pub mod sqlite;

mod error;

pub use error::StoreError;
pub use memory::MemoryWatchListStore;
pub use provider::WatchListStore;
pub use sqlite::SqliteWatchListStore;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
