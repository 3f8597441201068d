//! # tryst-server
//!
//! Session and presence core of the Tryst rendezvous network.
//!
//! The server tracks which identities are online, pushes presence
//! changes to their watchers, manages ad-hoc groups and group
//! broadcast, brokers direct connections between mutually-watching
//! identities, and relays opaque payloads. Watch-list persistence and
//! identity authentication are consumed through interfaces
//! ([`tryst_store::WatchListStore`], [`identity::IdentityResolver`]);
//! the wire is a thin length-prefixed bincode stream.

pub mod broker;
pub mod config;
pub mod error;
pub mod groups;
pub mod identity;
pub mod presence;
pub mod router;
pub mod session;
pub mod transport;

pub use config::ServerConfig;
pub use error::ServerError;
pub use router::Router;
