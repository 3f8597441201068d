use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SocialError;

/// A stable, externally-issued identity string.
///
/// The identity is the only durable key for a person; nicknames are
/// cosmetic and may collide. An `Identity` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a raw identity string, rejecting empty or whitespace-only input.
    pub fn new(raw: impl Into<String>) -> Result<Self, SocialError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(SocialError::InvalidArgument("identity must not be empty"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate an identity that arrived off the wire.
    ///
    /// Serde's transparent representation cannot reject empty strings,
    /// so boundary handlers call this before acting on a message.
    pub fn validate(&self) -> Result<(), SocialError> {
        if self.0.trim().is_empty() {
            return Err(SocialError::InvalidArgument("identity must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Presence status of a person.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    Offline,
    Online,
    Away,
}

/// A person as seen by the presence layer: identity plus mutable
/// nickname and status.
///
/// Registry equality is by identity only; the client mirror also
/// compares nickname/status to detect changes, via [`Person::same_state`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub identity: Identity,
    pub nickname: String,
    pub status: Status,
}

impl Person {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            nickname: String::new(),
            status: Status::Offline,
        }
    }

    pub fn with_nickname(identity: Identity, nickname: impl Into<String>) -> Self {
        Self {
            identity,
            nickname: nickname.into(),
            status: Status::Online,
        }
    }

    /// Full-state comparison, used by the client mirror for change
    /// detection. Registry code compares identities instead.
    pub fn same_state(&self, other: &Person) -> bool {
        self.identity == other.identity
            && self.nickname == other.nickname
            && self.status == other.status
    }
}

impl PartialEq for Person {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Person {}

/// A rendezvous endpoint exchanged during connection brokering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Server-allocated group identifier.
///
/// Ids are unique among live groups and may be reused once a group has
/// been destroyed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ad-hoc group: owner, participant set, integer id.
///
/// A live group always has at least one participant; the manager
/// destroys a group the moment its last participant leaves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub owner: Identity,
    participants: Vec<Identity>,
}

impl Group {
    pub fn new(id: GroupId, owner: Identity) -> Self {
        let participants = vec![owner.clone()];
        Self {
            id,
            owner,
            participants,
        }
    }

    /// Participants in insertion order.
    pub fn participants(&self) -> &[Identity] {
        &self.participants
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.participants.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Add a participant. Returns `false` when already present.
    pub fn add(&mut self, identity: Identity) -> bool {
        if self.participants.contains(&identity) {
            return false;
        }
        self.participants.push(identity);
        true
    }

    /// Remove a participant. Returns `false` when not present.
    pub fn remove(&mut self, identity: &Identity) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p != identity);
        self.participants.len() != before
    }

    /// Participant identities as a set, for diffing against another view
    /// of the same group.
    pub fn participant_set(&self) -> BTreeSet<Identity> {
        self.participants.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn test_identity_rejects_empty() {
        assert!(Identity::new("").is_err());
        assert!(Identity::new("   ").is_err());
        assert!(Identity::new("alice").is_ok());
    }

    #[test]
    fn test_person_equality_is_by_identity() {
        let a = Person::with_nickname(id("alice"), "Alice");
        let mut b = a.clone();
        b.nickname = "Alicia".to_string();
        b.status = Status::Away;

        assert_eq!(a, b);
        assert!(!a.same_state(&b));
    }

    #[test]
    fn test_group_membership_is_a_set() {
        let mut group = Group::new(GroupId(0), id("alice"));
        assert!(group.contains(&id("alice")));
        assert_eq!(group.len(), 1);

        assert!(group.add(id("bob")));
        assert!(!group.add(id("bob")));
        assert_eq!(group.len(), 2);

        assert!(group.remove(&id("bob")));
        assert!(!group.remove(&id("bob")));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_group_preserves_insertion_order() {
        let mut group = Group::new(GroupId(3), id("a"));
        group.add(id("c"));
        group.add(id("b"));

        let order: Vec<&str> = group.participants().iter().map(|p| p.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
    }
}
