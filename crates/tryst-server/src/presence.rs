//! Presence registry and the announce/disconnect flows.
//!
//! The registry owns "who is online": one [`Person`] record per
//! identity (created on first announce, never deleted, only marked
//! Offline) and the identity↔session bijection. The async announce
//! flow lives on [`Router`] so that no registry lock is held while the
//! identity resolver or the store is consulted.

use std::collections::HashMap;

use tryst_shared::protocol::WatchAction;
use tryst_shared::{Identity, Message, Person, Status};

use crate::router::Router;
use crate::session::{SessionHandle, SessionId};

/// How an announce changed the registry.
#[derive(Debug)]
pub enum AnnounceKind {
    /// First announce for this identity on a live session. When the
    /// identity was still bound to a stale session, that session is
    /// reported here for eviction.
    Joined { evicted: Option<SessionId> },
    /// Nickname/status update in place; binding untouched.
    Updated,
}

/// In-memory presence state. Guarded by one mutex on the router; all
/// methods are synchronous and must stay that way.
#[derive(Default)]
pub struct PresenceRegistry {
    people: HashMap<Identity, Person>,
    by_identity: HashMap<Identity, SessionId>,
    by_session: HashMap<SessionId, Identity>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announce. Returns the kind of change and the
    /// canonical person snapshot to push to watchers.
    pub fn announce(&mut self, session: SessionId, person: Person) -> (AnnounceKind, Person) {
        let identity = person.identity.clone();

        let record = self
            .people
            .entry(identity.clone())
            .or_insert_with(|| Person::new(identity.clone()));
        record.nickname = person.nickname;
        record.status = person.status;
        let snapshot = record.clone();

        match self.by_identity.get(&identity).copied() {
            Some(existing) if existing == session => (AnnounceKind::Updated, snapshot),
            other => {
                // New login wins; a stale binding is evicted.
                if let Some(stale) = other {
                    self.by_session.remove(&stale);
                }
                self.by_identity.insert(identity.clone(), session);
                self.by_session.insert(session, identity);
                (AnnounceKind::Joined { evicted: other }, snapshot)
            }
        }
    }

    /// Unbind a disconnecting session.
    ///
    /// Forces the identity's status to Offline and returns the final
    /// snapshot for watcher notification. Returns `None` when the
    /// session was never bound or was already superseded by a newer
    /// login.
    pub fn unbind(&mut self, session: SessionId) -> Option<Person> {
        let identity = self.by_session.remove(&session)?;

        // A newer session may own the identity by now.
        match self.by_identity.get(&identity) {
            Some(owner) if *owner == session => {
                self.by_identity.remove(&identity);
            }
            _ => return None,
        }

        let record = self.people.get_mut(&identity)?;
        record.status = Status::Offline;
        Some(record.clone())
    }

    pub fn session_of(&self, identity: &Identity) -> Option<SessionId> {
        self.by_identity.get(identity).copied()
    }

    pub fn identity_of(&self, session: SessionId) -> Option<Identity> {
        self.by_session.get(&session).cloned()
    }

    /// Known person record, or a default Offline record for identities
    /// never seen by this process.
    pub fn person(&self, identity: &Identity) -> Person {
        self.people
            .get(identity)
            .cloned()
            .unwrap_or_else(|| Person::new(identity.clone()))
    }

    /// Case-insensitive substring nickname search.
    pub fn search(&self, query: &str) -> Vec<Person> {
        let needle = query.to_lowercase();
        self.people
            .values()
            .filter(|p| p.nickname.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}

impl Router {
    /// Handle an inbound `PersonAnnounce`.
    ///
    /// The resolver confirms the claimed identity; a mismatch or
    /// resolver failure terminates the session and is never retried.
    pub async fn handle_announce(&self, session: &SessionHandle, person: Person) {
        if person.identity.validate().is_err() {
            tracing::warn!(session = %session.id, "announce with empty identity ignored");
            return;
        }

        let resolved = match self
            .resolver()
            .resolve(session.id, &person.identity)
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "identity resolution failed");
                session.close("identity not found or verified");
                return;
            }
        };

        if resolved != person.identity {
            tracing::warn!(
                session = %session.id,
                claimed = %person.identity,
                resolved = %resolved,
                "announced identity mismatch"
            );
            session.close("identity not found or verified");
            return;
        }

        let (kind, snapshot) = {
            let mut presence = self.presence().lock().expect("presence lock poisoned");
            presence.announce(session.id, person)
        };

        if let AnnounceKind::Joined { evicted } = kind {
            if let Some(stale) = evicted {
                tracing::info!(
                    identity = %snapshot.identity,
                    old_session = %stale,
                    new_session = %session.id,
                    "evicting stale session after reconnect"
                );
                if let Some(handle) = self.sessions().get(stale) {
                    handle.close("superseded by a newer login");
                }
            }

            self.bootstrap_watch_list(session, &snapshot.identity);
        }

        self.notify_watchers(&snapshot);
    }

    /// On join, either ask the client to replay its watch-list (the
    /// server has nothing stored) or push the stored set as a full
    /// reset.
    fn bootstrap_watch_list(&self, session: &SessionHandle, identity: &Identity) {
        let watched = match self.store().get_watched(identity) {
            Ok(watched) => watched,
            Err(e) => {
                tracing::error!(identity = %identity, error = %e, "watch-list lookup failed");
                return;
            }
        };

        if watched.is_empty() {
            session.send(Message::RequestWatchList);
            return;
        }

        let people = {
            let presence = self.presence().lock().expect("presence lock poisoned");
            watched.iter().map(|target| presence.person(target)).collect()
        };
        session.send(Message::WatchListDelta {
            action: WatchAction::Reset,
            people,
        });
    }

    /// Push an updated person to every watcher with a live session.
    ///
    /// Best effort, at most once: offline watchers are skipped and one
    /// recipient's failure never blocks the others.
    pub(crate) fn notify_watchers(&self, person: &Person) {
        let watchers = match self.store().get_watchers(&person.identity) {
            Ok(watchers) => watchers,
            Err(e) => {
                tracing::error!(identity = %person.identity, error = %e, "watcher lookup failed");
                return;
            }
        };
        if watchers.is_empty() {
            return;
        }

        let live: Vec<SessionId> = {
            let presence = self.presence().lock().expect("presence lock poisoned");
            watchers
                .iter()
                .filter_map(|watcher| presence.session_of(watcher))
                .collect()
        };

        for session_id in live {
            if let Some(handle) = self.sessions().get(session_id) {
                handle.send(Message::PersonAnnounce {
                    person: person.clone(),
                });
            }
        }
    }

    /// Tear down a disconnecting session: fail in-flight requests,
    /// release resolver state, unbind, and notify watchers of the
    /// final Offline state.
    pub fn handle_disconnect(&self, session: &SessionHandle) {
        session.fail_pending();
        self.sessions().remove(session.id);
        self.resolver().release(session.id);

        let final_state = {
            let mut presence = self.presence().lock().expect("presence lock poisoned");
            presence.unbind(session.id)
        };

        if let Some(person) = final_state {
            tracing::info!(identity = %person.identity, session = %session.id, "identity went offline");
            self.notify_watchers(&person);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn online(s: &str, nick: &str) -> Person {
        Person::with_nickname(id(s), nick)
    }

    #[test]
    fn test_first_announce_is_join() {
        let mut registry = PresenceRegistry::new();
        let session = SessionId::new();

        let (kind, snapshot) = registry.announce(session, online("alice", "Alice"));
        assert!(matches!(kind, AnnounceKind::Joined { evicted: None }));
        assert_eq!(snapshot.status, Status::Online);
        assert_eq!(registry.session_of(&id("alice")), Some(session));
        assert_eq!(registry.identity_of(session), Some(id("alice")));
    }

    #[test]
    fn test_second_announce_updates_in_place() {
        let mut registry = PresenceRegistry::new();
        let session = SessionId::new();
        registry.announce(session, online("alice", "Alice"));

        let mut away = online("alice", "Alice in a meeting");
        away.status = Status::Away;
        let (kind, snapshot) = registry.announce(session, away);

        assert!(matches!(kind, AnnounceKind::Updated));
        assert_eq!(snapshot.status, Status::Away);
        assert_eq!(snapshot.nickname, "Alice in a meeting");
    }

    #[test]
    fn test_reconnect_evicts_stale_session() {
        let mut registry = PresenceRegistry::new();
        let old = SessionId::new();
        let new = SessionId::new();
        registry.announce(old, online("alice", "Alice"));

        let (kind, _) = registry.announce(new, online("alice", "Alice"));
        match kind {
            AnnounceKind::Joined { evicted } => assert_eq!(evicted, Some(old)),
            other => panic!("expected join, got {other:?}"),
        }
        assert_eq!(registry.session_of(&id("alice")), Some(new));

        // Unbinding the evicted session must not touch the new binding.
        assert!(registry.unbind(old).is_none());
        assert_eq!(registry.session_of(&id("alice")), Some(new));
    }

    #[test]
    fn test_unbind_forces_offline() {
        let mut registry = PresenceRegistry::new();
        let session = SessionId::new();
        registry.announce(session, online("alice", "Alice"));

        let final_state = registry.unbind(session).unwrap();
        assert_eq!(final_state.status, Status::Offline);
        assert!(registry.session_of(&id("alice")).is_none());

        // The person record survives the disconnect.
        assert_eq!(registry.person(&id("alice")).nickname, "Alice");
    }

    #[test]
    fn test_search_matches_substring_case_insensitive() {
        let mut registry = PresenceRegistry::new();
        registry.announce(SessionId::new(), online("alice", "Alice Wonder"));
        registry.announce(SessionId::new(), online("bob", "Builder"));

        let hits = registry.search("wonder");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identity, id("alice"));

        assert!(registry.search("nobody").is_empty());
    }
}
