//! Inbound message dispatch and outbound fan-out.
//!
//! One [`Router`] instance is shared by every connection task. Each
//! session's packets are handled in arrival order by its own task;
//! handlers across sessions run concurrently against the shared
//! registries, each of which sits behind its own coarse mutex. No
//! handler holds a lock across an await point.

use std::sync::{Arc, Mutex};

use chrono::Utc;

use tryst_shared::protocol::{Message, Packet, WatchAction};
use tryst_shared::{Group, GroupId, Identity, Person};
use tryst_store::WatchListStore;

use crate::groups::GroupManager;
use crate::identity::IdentityResolver;
use crate::presence::PresenceRegistry;
use crate::session::{SessionHandle, SessionTable};

/// Shared server core: registries, store, resolver, session table.
pub struct Router {
    store: Arc<dyn WatchListStore>,
    resolver: Arc<dyn IdentityResolver>,
    sessions: SessionTable,
    presence: Mutex<PresenceRegistry>,
    groups: Mutex<GroupManager>,
}

impl Router {
    pub fn new(store: Arc<dyn WatchListStore>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self {
            store,
            resolver,
            sessions: SessionTable::new(),
            presence: Mutex::new(PresenceRegistry::new()),
            groups: Mutex::new(GroupManager::new()),
        }
    }

    pub(crate) fn store(&self) -> &dyn WatchListStore {
        self.store.as_ref()
    }

    pub(crate) fn resolver(&self) -> &dyn IdentityResolver {
        self.resolver.as_ref()
    }

    pub(crate) fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub(crate) fn presence(&self) -> &Mutex<PresenceRegistry> {
        &self.presence
    }

    pub(crate) fn groups(&self) -> &Mutex<GroupManager> {
        &self.groups
    }

    /// Register a freshly accepted session.
    pub fn register_session(&self, handle: SessionHandle) {
        self.sessions.insert(handle);
    }

    /// Handle one inbound packet for `session`.
    pub async fn handle_packet(&self, session: &SessionHandle, packet: Packet) {
        // Replies route to the request awaiting them.
        if let Some(request_seq) = packet.in_reply_to {
            if !session.resolve_reply(request_seq, packet.message) {
                tracing::debug!(
                    session = %session.id,
                    request_seq,
                    "reply with no pending request dropped"
                );
            }
            return;
        }

        let seq = packet.seq;
        match packet.message {
            Message::PersonAnnounce { person } => {
                self.handle_announce(session, person).await;
            }

            Message::WatchListDelta { action, people } => {
                self.handle_watch_delta(session, action, people);
            }

            Message::Search { nickname } => {
                let results = if nickname.trim().is_empty() {
                    Vec::new()
                } else {
                    let presence = self.presence.lock().expect("presence lock poisoned");
                    presence.search(&nickname)
                };
                session.reply(seq, Message::SearchResult { results });
            }

            Message::CreateGroup => {
                let Some(identity) = self.require_identity(session) else {
                    return;
                };
                let group = {
                    let mut groups = self.groups.lock().expect("group lock poisoned");
                    groups.create(identity)
                };
                session.reply(seq, Message::GroupCreated { group });
            }

            Message::InviteToGroup { group_id, invitee } => {
                let Some(inviter) = self.require_identity(session) else {
                    return;
                };
                let response = self.handle_invite(&inviter, group_id, invitee).await;
                session.reply(seq, Message::InviteResult { response });
            }

            Message::LeaveGroup { group_id } => {
                let Some(identity) = self.require_identity(session) else {
                    return;
                };
                self.handle_leave(group_id, &identity);
            }

            Message::Text { group_id, text, .. } => {
                let Some(sender) = self.require_identity(session) else {
                    return;
                };
                self.handle_text(group_id, sender, text);
            }

            Message::ConnectRequest { target } => {
                let Some(requester) = self.require_identity(session) else {
                    return;
                };
                let (result, endpoint) = self.handle_connect(&requester, session, target).await;
                session.reply(seq, Message::ConnectResult { result, endpoint });
            }

            Message::Forward {
                target,
                protocol,
                kind,
                payload,
            } => {
                let Some(sender) = self.require_identity(session) else {
                    return;
                };
                self.handle_forward(sender, target, protocol, kind, payload);
            }

            other => {
                tracing::warn!(
                    session = %session.id,
                    message = ?other,
                    "client sent a server-to-client message"
                );
            }
        }
    }

    /// Bound identity of a session, or terminate the session.
    ///
    /// Every operation past the watch-list sync requires a completed
    /// announce; a session that skips it cannot be attributed to
    /// anyone and is closed the way an identity failure closes it.
    fn require_identity(&self, session: &SessionHandle) -> Option<Identity> {
        let identity = {
            let presence = self.presence.lock().expect("presence lock poisoned");
            presence.identity_of(session.id)
        };
        if identity.is_none() {
            tracing::warn!(session = %session.id, "operation before announce");
            session.close("identity not found or verified");
        }
        identity
    }

    /// Apply a client's watch-list delta to the store.
    ///
    /// The delta is validated as a whole before any mutation: one
    /// invalid entry rejects the entire delta, so a Reset can never
    /// clear the stored set and then fail to repopulate it.
    fn handle_watch_delta(
        &self,
        session: &SessionHandle,
        action: WatchAction,
        people: Vec<Person>,
    ) {
        let Some(owner) = self.require_identity(session) else {
            return;
        };

        let targets: Vec<Identity> = people.into_iter().map(|p| p.identity).collect();
        if targets.iter().any(|target| target.validate().is_err()) {
            tracing::warn!(owner = %owner, "watch-list delta with empty identity rejected");
            return;
        }
        let result = match action {
            WatchAction::Add => self.store.add_range(&owner, &targets),
            WatchAction::Remove => targets
                .iter()
                .try_for_each(|target| self.store.remove(&owner, target)),
            WatchAction::Reset => self
                .store
                .clear(&owner)
                .and_then(|_| self.store.add_range(&owner, &targets)),
        };

        if let Err(e) = result {
            tracing::error!(owner = %owner, error = %e, "watch-list mutation failed");
        }
    }

    fn handle_leave(&self, group_id: GroupId, identity: &Identity) {
        let outcome = {
            let mut groups = self.groups.lock().expect("group lock poisoned");
            groups.leave(group_id, identity)
        };
        if let Some(outcome) = outcome {
            // One update per transition; a destroyed group has no
            // remaining recipients.
            self.broadcast_group_update(&outcome.group);
        }
    }

    fn handle_text(&self, group_id: GroupId, sender: Identity, text: String) {
        let group = {
            let groups = self.groups.lock().expect("group lock poisoned");
            groups.get(group_id)
        };
        let Some(group) = group else {
            tracing::debug!(group = %group_id, "text for unknown group dropped");
            return;
        };
        if !group.contains(&sender) {
            tracing::debug!(group = %group_id, sender = %sender, "text from non-participant dropped");
            return;
        }

        let sender_session = {
            let presence = self.presence.lock().expect("presence lock poisoned");
            presence.session_of(&sender)
        };
        let message = Message::Text {
            group_id,
            sender: Some(sender),
            text,
            timestamp: Utc::now(),
        };
        for handle in self.live_participants(&group) {
            if Some(handle.id) == sender_session {
                continue;
            }
            handle.send(message.clone());
        }
    }

    fn handle_forward(
        &self,
        sender: Identity,
        target: Identity,
        protocol: u16,
        kind: u16,
        payload: Vec<u8>,
    ) {
        if target.validate().is_err() {
            tracing::warn!(sender = %sender, "forward with empty target dropped");
            return;
        }

        let target_session = {
            let presence = self.presence.lock().expect("presence lock poisoned");
            presence.session_of(&target)
        };
        match target_session.and_then(|id| self.sessions.get(id)) {
            Some(handle) => {
                // The recipient sees who the payload came from.
                handle.send(Message::Forward {
                    target: sender,
                    protocol,
                    kind,
                    payload,
                });
            }
            None => {
                tracing::debug!(target = %target, "forward to offline identity dropped");
            }
        }
    }

    /// Send a `GroupUpdate` to every participant with a live session.
    pub(crate) fn broadcast_group_update(&self, group: &Group) {
        for handle in self.live_participants(group) {
            handle.send(Message::GroupUpdate {
                group: group.clone(),
            });
        }
    }

    fn live_participants(&self, group: &Group) -> Vec<SessionHandle> {
        let session_ids: Vec<_> = {
            let presence = self.presence.lock().expect("presence lock poisoned");
            group
                .participants()
                .iter()
                .filter_map(|p| presence.session_of(p))
                .collect()
        };
        session_ids
            .into_iter()
            .filter_map(|id| self.sessions.get(id))
            .collect()
    }
}
