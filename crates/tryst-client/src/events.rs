//! Events surfaced to the embedding application.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use tryst_shared::protocol::InvitationResponse;
use tryst_shared::{Endpoint, Group, GroupId, Identity};

use crate::mirror::{GroupChange, WatchChange};

/// Everything the server can push at us, as a typed event stream.
#[derive(Debug)]
pub enum ClientEvent {
    /// The server has no stored watch-list for us and asks for a full
    /// replay. The library replays the local replica automatically;
    /// this event also signals that the application should persist its
    /// list locally.
    WatchListRequested,

    /// The watch-list replica changed (presence update, server delta,
    /// or reset).
    WatchChanged(WatchChange),

    /// A group we participate in changed.
    GroupChanged(GroupChange),

    /// Someone invited us into a group. Send the answer through
    /// `responder`; dropping it declines the invitation.
    InviteReceived {
        group: Group,
        responder: oneshot::Sender<InvitationResponse>,
    },

    /// Group chat line.
    TextReceived {
        group_id: GroupId,
        sender: Identity,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A brokered connection is starting; dial `endpoint` (or await the
    /// peer, when `you_are_host` is set).
    StartingConnection {
        peer: Identity,
        endpoint: Endpoint,
        you_are_host: bool,
    },

    /// Opaque payload relayed from another identity.
    Forwarded {
        source: Identity,
        protocol: u16,
        kind: u16,
        payload: Vec<u8>,
    },
}
