//! Shared types, wire protocol and error taxonomy for the Tryst
//! rendezvous network.
//!
//! Everything in this crate is plain data: the server and client crates
//! agree on these definitions and nothing here touches the network.

pub mod error;
pub mod protocol;
pub mod types;

pub use error::SocialError;
pub use protocol::{Message, Packet};
pub use types::{Endpoint, Group, GroupId, Identity, Person, Status};
