//! Live group table.
//!
//! The manager owns every live group, allocates ids, and reports
//! membership changes as explicit return values; the router turns those
//! into `GroupUpdate` fan-out. A group exists from creation until its
//! last participant leaves, at which point it is removed atomically;
//! a group reachable by id always has at least one participant.

use std::collections::HashMap;

use tryst_shared::{Group, GroupId, Identity};

/// Result of a leave operation that changed something.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    /// Snapshot after the removal. Empty participants iff `destroyed`.
    pub group: Group,
    pub destroyed: bool,
}

/// Owns the set of live groups.
#[derive(Default)]
pub struct GroupManager {
    groups: HashMap<GroupId, Group>,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest non-negative id not used by any live group. Ids of
    /// destroyed groups are eligible for reuse.
    fn allocate_id(&self) -> GroupId {
        let mut candidate = 0u32;
        while self.groups.contains_key(&GroupId(candidate)) {
            candidate += 1;
        }
        GroupId(candidate)
    }

    /// Create a group whose sole participant and owner is `creator`.
    pub fn create(&mut self, creator: Identity) -> Group {
        let id = self.allocate_id();
        let group = Group::new(id, creator);
        self.groups.insert(id, group.clone());
        tracing::debug!(group = %id, owner = %group.owner, "group created");
        group
    }

    /// Add `identity` to a group.
    ///
    /// Unknown group ids are silently ignored. Returns a snapshot only
    /// when membership actually changed.
    pub fn join(&mut self, id: GroupId, identity: Identity) -> Option<Group> {
        let group = self.groups.get_mut(&id)?;
        if !group.add(identity) {
            return None;
        }
        tracing::debug!(group = %id, "participant joined");
        Some(group.clone())
    }

    /// Remove `identity` from a group.
    ///
    /// No-op when the group is unknown or `identity` is not a
    /// participant. Destroys the group when it becomes empty.
    pub fn leave(&mut self, id: GroupId, identity: &Identity) -> Option<LeaveOutcome> {
        let group = self.groups.get_mut(&id)?;
        if !group.remove(identity) {
            return None;
        }

        if group.is_empty() {
            let group = self.groups.remove(&id).expect("group vanished under lock");
            tracing::debug!(group = %id, "group destroyed");
            return Some(LeaveOutcome {
                group,
                destroyed: true,
            });
        }

        tracing::debug!(group = %id, "participant left");
        Some(LeaveOutcome {
            group: group.clone(),
            destroyed: false,
        })
    }

    /// Snapshot of a live group.
    pub fn get(&self, id: GroupId) -> Option<Group> {
        self.groups.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn test_create_yields_singleton_group() {
        let mut gm = GroupManager::new();
        let group = gm.create(id("alice"));

        assert_eq!(group.participants(), [id("alice")]);
        assert_eq!(group.owner, id("alice"));
        assert_eq!(gm.len(), 1);
    }

    #[test]
    fn test_ids_unique_among_live_groups() {
        let mut gm = GroupManager::new();
        let a = gm.create(id("alice"));
        let b = gm.create(id("bob"));
        let c = gm.create(id("carol"));

        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_id_reuse_after_destroy() {
        let mut gm = GroupManager::new();
        let first = gm.create(id("alice"));
        let second = gm.create(id("bob"));

        let outcome = gm.leave(first.id, &id("alice")).unwrap();
        assert!(outcome.destroyed);
        assert!(gm.get(first.id).is_none());

        // The freed id is the lowest unused again.
        let third = gm.create(id("carol"));
        assert_eq!(third.id, first.id);
        assert_ne!(third.id, second.id);
    }

    #[test]
    fn test_join_unknown_group_is_noop() {
        let mut gm = GroupManager::new();
        assert!(gm.join(GroupId(99), id("alice")).is_none());
        assert!(gm.is_empty());
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut gm = GroupManager::new();
        let group = gm.create(id("alice"));

        assert!(gm.join(group.id, id("bob")).is_some());
        // Second join changes nothing and must not report an update.
        assert!(gm.join(group.id, id("bob")).is_none());
        assert_eq!(gm.get(group.id).unwrap().len(), 2);
    }

    #[test]
    fn test_join_then_leave_round_trip() {
        let mut gm = GroupManager::new();
        let group = gm.create(id("alice"));
        gm.join(group.id, id("bob"));

        let joined = gm.join(group.id, id("carol")).unwrap();
        assert!(joined.contains(&id("carol")));

        let outcome = gm.leave(group.id, &id("carol")).unwrap();
        assert!(!outcome.destroyed);
        assert_eq!(
            outcome.group.participant_set(),
            [id("alice"), id("bob")].into_iter().collect()
        );
    }

    #[test]
    fn test_leave_nonparticipant_is_noop() {
        let mut gm = GroupManager::new();
        let group = gm.create(id("alice"));

        assert!(gm.leave(group.id, &id("mallory")).is_none());
        assert!(gm.leave(GroupId(42), &id("alice")).is_none());
        assert_eq!(gm.get(group.id).unwrap().len(), 1);
    }

    #[test]
    fn test_last_leave_destroys_group() {
        let mut gm = GroupManager::new();
        let group = gm.create(id("alice"));

        let outcome = gm.leave(group.id, &id("alice")).unwrap();
        assert!(outcome.destroyed);
        assert!(outcome.group.is_empty());
        assert!(gm.get(group.id).is_none());
        assert!(gm.is_empty());
    }
}
