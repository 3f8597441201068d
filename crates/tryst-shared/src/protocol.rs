use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Endpoint, Group, GroupId, Identity, Person};

/// How a watch-list delta mutates the receiving set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WatchAction {
    /// Add the listed people to the set.
    Add,
    /// Remove the listed people from the set.
    Remove,
    /// Replace the set with the listed people.
    Reset,
}

/// Outcome of a direct-connect brokering request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectOutcome {
    Success,
    /// The target has no live session.
    FailedNotFound,
    /// The mutual watch relationship is missing.
    FailedNotFollowing,
    /// The target declined.
    FailedRejected,
}

/// Invitee's answer to a group invitation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InvitationResponse {
    /// Covers authorization failures and "group no longer exists".
    Error,
    Accepted,
    Rejected,
    /// The invitee has no live session.
    Offline,
}

/// All protocol messages exchanged between client and server.
///
/// Semantics only; framing and byte encoding live at the transport
/// layer. Request/response pairs correlate through [`Packet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Join or update presence (client), or a watched person's update
    /// pushed to a watcher (server).
    PersonAnnounce { person: Person },

    /// Server asks the client to resend its full watch-list. Sent on
    /// join when the server has nothing stored for the identity.
    RequestWatchList,

    /// Watch-list synchronization in either direction.
    WatchListDelta {
        action: WatchAction,
        people: Vec<Person>,
    },

    /// Substring nickname lookup.
    Search { nickname: String },
    SearchResult { results: Vec<Person> },

    /// Ask the server to allocate a group with the sender as sole
    /// participant.
    CreateGroup,
    GroupCreated { group: Group },

    /// Server push: a group the recipient participates in changed.
    GroupUpdate { group: Group },

    /// Ask the server to invite `invitee` into `group_id`.
    InviteToGroup {
        group_id: GroupId,
        invitee: Identity,
    },
    /// Inviter's answer: the invitee's actual response.
    InviteResult { response: InvitationResponse },

    /// Server forwards an invitation to the invitee.
    GroupInvite { group: Group },
    GroupInviteResponse {
        group_id: GroupId,
        response: InvitationResponse,
    },

    LeaveGroup { group_id: GroupId },

    /// Group chat; the server fills `sender` before relaying.
    Text {
        group_id: GroupId,
        sender: Option<Identity>,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Ask the server to broker a direct connection to `target`.
    ConnectRequest { target: Identity },
    ConnectResult {
        result: ConnectOutcome,
        endpoint: Option<Endpoint>,
    },

    /// Rendezvous payload: connect to `peer` at `endpoint`; exactly one
    /// of the two parties receives `you_are_host = true`.
    ConnectTo {
        peer: Identity,
        endpoint: Endpoint,
        you_are_host: bool,
    },

    /// Opaque relay between two identities. The server never interprets
    /// the payload.
    Forward {
        target: Identity,
        protocol: u16,
        kind: u16,
        payload: Vec<u8>,
    },
}

/// Correlation envelope for a single ordered stream.
///
/// `seq` is assigned by the sender; a reply carries the request's `seq`
/// in `in_reply_to` so the requester can match it to a pending call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub seq: u64,
    pub in_reply_to: Option<u64>,
    pub message: Message,
}

impl Packet {
    pub fn push(seq: u64, message: Message) -> Self {
        Self {
            seq,
            in_reply_to: None,
            message,
        }
    }

    pub fn reply(seq: u64, request_seq: u64, message: Message) -> Self {
        Self {
            seq,
            in_reply_to: Some(request_seq),
            message,
        }
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    #[test]
    fn test_packet_roundtrip() {
        let person = Person {
            identity: Identity::new("alice").unwrap(),
            nickname: "Alice".to_string(),
            status: Status::Online,
        };
        let packet = Packet::push(7, Message::PersonAnnounce { person });

        let bytes = packet.to_bytes().unwrap();
        let restored = Packet::from_bytes(&bytes).unwrap();

        assert_eq!(restored.seq, 7);
        assert_eq!(restored.in_reply_to, None);
        match restored.message {
            Message::PersonAnnounce { person } => {
                assert_eq!(person.identity.as_str(), "alice");
                assert_eq!(person.status, Status::Online);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_reply_carries_request_seq() {
        let packet = Packet::reply(
            9,
            4,
            Message::InviteResult {
                response: InvitationResponse::Accepted,
            },
        );

        let restored = Packet::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.in_reply_to, Some(4));
    }
}
