//! Local replicas of server-side state.
//!
//! The client keeps two mirrors: the watch-list (people I watch) and
//! the group view (groups I'm in). Local mutations and remote pushes
//! use the same add/remove/reset vocabulary, so either side can
//! reconstruct the same final set from a sequence of deltas. All the
//! logic here is synchronous and side-effect free; the [`Client`]
//! wires it to the protocol.
//!
//! [`Client`]: crate::Client

use std::collections::HashMap;

use tryst_shared::protocol::WatchAction;
use tryst_shared::{Group, GroupId, Identity, Person};

/// A change observed by the watch-list mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchChange {
    Added(Person),
    Removed(Person),
    /// Nickname or status changed for a watched person.
    Updated(Person),
    /// The set was replaced wholesale; carries the new contents only.
    Reset(Vec<Person>),
}

/// Replica of "people I watch".
#[derive(Default)]
pub struct WatchListMirror {
    people: HashMap<Identity, Person>,
}

impl WatchListMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locally add a person. Returns `false` when already present
    /// (nothing to broadcast).
    pub fn insert_local(&mut self, person: Person) -> bool {
        if self.people.contains_key(&person.identity) {
            return false;
        }
        self.people.insert(person.identity.clone(), person);
        true
    }

    /// Locally remove a person, returning the removed record.
    pub fn remove_local(&mut self, identity: &Identity) -> Option<Person> {
        self.people.remove(identity)
    }

    /// Apply a delta pushed by the server.
    pub fn apply_delta(&mut self, action: WatchAction, people: Vec<Person>) -> Vec<WatchChange> {
        match action {
            WatchAction::Add => people
                .into_iter()
                .filter_map(|person| self.apply_person(person))
                .collect(),
            WatchAction::Remove => people
                .into_iter()
                .filter_map(|person| {
                    self.people
                        .remove(&person.identity)
                        .map(WatchChange::Removed)
                })
                .collect(),
            WatchAction::Reset => {
                // A reset must not leak stale entries.
                self.people.clear();
                for person in &people {
                    self.people.insert(person.identity.clone(), person.clone());
                }
                vec![WatchChange::Reset(people)]
            }
        }
    }

    /// Apply a presence update for a single person.
    ///
    /// The server only pushes updates for people we watch, so an
    /// unknown identity is added (this covers the storage-less
    /// bootstrap where the server learned our list before we did).
    pub fn apply_person(&mut self, person: Person) -> Option<WatchChange> {
        match self.people.get_mut(&person.identity) {
            Some(existing) => {
                if existing.same_state(&person) {
                    return None;
                }
                *existing = person.clone();
                Some(WatchChange::Updated(person))
            }
            None => {
                self.people.insert(person.identity.clone(), person.clone());
                Some(WatchChange::Added(person))
            }
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<&Person> {
        self.people.get(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.people.contains_key(identity)
    }

    pub fn snapshot(&self) -> Vec<Person> {
        self.people.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }
}

/// A change observed by the group view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChange {
    /// Remote snapshot the change was computed from.
    pub group: Group,
    /// Participants present remotely but not locally.
    pub added: Vec<Identity>,
    /// Participants present locally but not remotely.
    pub removed: Vec<Identity>,
    /// The local user is no longer a participant; the group left the
    /// view.
    pub left: bool,
}

/// Replica of "groups I'm in".
pub struct GroupView {
    me: Identity,
    groups: HashMap<GroupId, Group>,
}

impl GroupView {
    pub fn new(me: Identity) -> Self {
        Self {
            me,
            groups: HashMap::new(),
        }
    }

    /// Record a group we created or joined directly.
    pub fn track(&mut self, group: Group) {
        self.groups.insert(group.id, group);
    }

    /// Drop a group after a local leave.
    pub fn untrack(&mut self, id: GroupId) -> Option<Group> {
        self.groups.remove(&id)
    }

    /// Apply a remote `GroupUpdate` as a two-way set difference so only
    /// actual changes produce participant-level events.
    pub fn apply_update(&mut self, remote: Group) -> GroupChange {
        let local_set = self
            .groups
            .get(&remote.id)
            .map(|g| g.participant_set())
            .unwrap_or_default();
        let remote_set = remote.participant_set();

        let added: Vec<Identity> = remote_set.difference(&local_set).cloned().collect();
        let removed: Vec<Identity> = local_set.difference(&remote_set).cloned().collect();

        let left = !remote.contains(&self.me);
        if left {
            self.groups.remove(&remote.id);
        } else {
            self.groups.insert(remote.id, remote.clone());
        }

        GroupChange {
            group: remote,
            added,
            removed,
            left,
        }
    }

    pub fn get(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn snapshot(&self) -> Vec<Group> {
        self.groups.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tryst_shared::Status;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn person(s: &str) -> Person {
        Person::with_nickname(id(s), s.to_uppercase())
    }

    #[test]
    fn test_reset_replaces_set_without_leaks() {
        let mut mirror = WatchListMirror::new();
        mirror.insert_local(person("x"));
        mirror.insert_local(person("y"));

        let changes = mirror.apply_delta(WatchAction::Reset, vec![person("z")]);

        assert_eq!(changes, vec![WatchChange::Reset(vec![person("z")])]);
        assert_eq!(mirror.len(), 1);
        assert!(mirror.contains(&id("z")));
        assert!(!mirror.contains(&id("x")));
        assert!(!mirror.contains(&id("y")));
    }

    #[test]
    fn test_add_and_remove_deltas() {
        let mut mirror = WatchListMirror::new();

        let changes = mirror.apply_delta(WatchAction::Add, vec![person("a"), person("b")]);
        assert_eq!(changes.len(), 2);
        assert_eq!(mirror.len(), 2);

        // Re-adding produces no change events.
        let changes = mirror.apply_delta(WatchAction::Add, vec![person("a")]);
        assert!(changes.is_empty());

        let changes = mirror.apply_delta(WatchAction::Remove, vec![person("a"), person("c")]);
        assert_eq!(changes, vec![WatchChange::Removed(person("a"))]);
        assert_eq!(mirror.len(), 1);
    }

    #[test]
    fn test_presence_update_detects_change() {
        let mut mirror = WatchListMirror::new();
        mirror.insert_local(person("a"));

        // Identical state: no event.
        assert!(mirror.apply_person(person("a")).is_none());

        let mut away = person("a");
        away.status = Status::Away;
        let change = mirror.apply_person(away.clone()).unwrap();
        assert_eq!(change, WatchChange::Updated(away));

        // Unknown person gets added.
        let change = mirror.apply_person(person("new")).unwrap();
        assert!(matches!(change, WatchChange::Added(_)));
    }

    #[test]
    fn test_group_update_two_way_diff() {
        let mut view = GroupView::new(id("me"));
        let mut group = Group::new(GroupId(1), id("me"));
        view.track(group.clone());

        group.add(id("friend"));
        let change = view.apply_update(group.clone());

        assert_eq!(change.added, vec![id("friend")]);
        assert!(change.removed.is_empty());
        assert!(!change.left);

        group.remove(&id("friend"));
        let change = view.apply_update(group);
        assert!(change.added.is_empty());
        assert_eq!(change.removed, vec![id("friend")]);
    }

    #[test]
    fn test_group_update_without_me_leaves_view() {
        let mut view = GroupView::new(id("me"));
        let mut group = Group::new(GroupId(2), id("me"));
        group.add(id("other"));
        view.track(group.clone());

        group.remove(&id("me"));
        let change = view.apply_update(group);

        assert!(change.left);
        assert_eq!(change.removed, vec![id("me")]);
        assert!(view.get(GroupId(2)).is_none());
    }

    #[test]
    fn test_unchanged_update_produces_empty_diff() {
        let mut view = GroupView::new(id("me"));
        let group = Group::new(GroupId(3), id("me"));
        view.track(group.clone());

        let change = view.apply_update(group);
        assert!(change.added.is_empty());
        assert!(change.removed.is_empty());
        assert!(!change.left);
    }
}
