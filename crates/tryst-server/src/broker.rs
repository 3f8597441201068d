//! Connection brokering: group invitations and direct-connect
//! rendezvous.
//!
//! Both flows gate on the watch relation (you may only reach people on
//! your watch-list) and neither holds a registry lock while awaiting
//! the remote party; locks are re-acquired only around the bounded
//! mutation once the awaited result is in.

use tryst_shared::protocol::{ConnectOutcome, InvitationResponse, Message};
use tryst_shared::{Endpoint, GroupId, Identity};

use crate::router::Router;
use crate::session::SessionHandle;

impl Router {
    /// Invite `invitee` into `group_id` on behalf of `inviter`.
    ///
    /// Returns the invitee's actual response. `Error` covers the
    /// missing watch relationship, infrastructure failures, and the
    /// group vanishing before the atomic join.
    pub async fn handle_invite(
        &self,
        inviter: &Identity,
        group_id: GroupId,
        invitee: Identity,
    ) -> InvitationResponse {
        if invitee.validate().is_err() {
            return InvitationResponse::Error;
        }

        // Authorization gate: inviter must watch the invitee.
        match self.store().is_watcher(inviter, &invitee) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(inviter = %inviter, invitee = %invitee, "invite not authorized");
                return InvitationResponse::Error;
            }
            Err(e) => {
                tracing::error!(error = %e, "watch-list lookup failed during invite");
                return InvitationResponse::Error;
            }
        }

        let invitee_session = {
            let presence = self.presence().lock().expect("presence lock poisoned");
            presence.session_of(&invitee)
        };
        let invitee_handle = match invitee_session.and_then(|id| self.sessions().get(id)) {
            Some(handle) => handle,
            None => return InvitationResponse::Offline,
        };

        let group = {
            let groups = self.groups().lock().expect("group lock poisoned");
            groups.get(group_id)
        };
        let group = match group {
            Some(group) => group,
            None => return InvitationResponse::Error,
        };

        // Round trip to the invitee; no lock held while suspended.
        let reply = invitee_handle
            .request(Message::GroupInvite { group })
            .await;
        let response = match reply {
            Ok(Message::GroupInviteResponse {
                group_id: replied_id,
                response,
            }) => {
                if replied_id != group_id {
                    tracing::warn!(
                        invitee = %invitee,
                        expected = %group_id,
                        replied = %replied_id,
                        "invite reply names the wrong group"
                    );
                    return InvitationResponse::Error;
                }
                response
            }
            Ok(other) => {
                tracing::warn!(invitee = %invitee, reply = ?other, "unexpected invite reply");
                return InvitationResponse::Error;
            }
            Err(_) => return InvitationResponse::Offline,
        };

        if response != InvitationResponse::Accepted {
            return response;
        }

        // Atomic join; the group may have been destroyed while we
        // waited for the invitee.
        let updated = {
            let mut groups = self.groups().lock().expect("group lock poisoned");
            groups.join(group_id, invitee.clone())
        };
        match updated {
            Some(group) => {
                self.broadcast_group_update(&group);
                InvitationResponse::Accepted
            }
            None => {
                let exists = {
                    let groups = self.groups().lock().expect("group lock poisoned");
                    groups.get(group_id).is_some()
                };
                if exists {
                    // Already a participant; accepted join is idempotent.
                    InvitationResponse::Accepted
                } else {
                    tracing::debug!(group = %group_id, "group vanished before invite join");
                    InvitationResponse::Error
                }
            }
        }
    }

    /// Broker a direct connection from `requester` to `target`.
    ///
    /// Requires a mutual watch relationship. On success the target
    /// receives a `ConnectTo` with the requester's endpoint (target is
    /// designated host) and the requester gets the target's endpoint in
    /// the `ConnectResult`.
    pub async fn handle_connect(
        &self,
        requester: &Identity,
        requester_session: &SessionHandle,
        target: Identity,
    ) -> (ConnectOutcome, Option<Endpoint>) {
        if target.validate().is_err() {
            return (ConnectOutcome::FailedNotFound, None);
        }

        let mutual = self
            .store()
            .is_watcher(requester, &target)
            .and_then(|forward| {
                Ok(forward && self.store().is_watcher(&target, requester)?)
            });
        match mutual {
            Ok(true) => {}
            Ok(false) => return (ConnectOutcome::FailedNotFollowing, None),
            Err(e) => {
                tracing::error!(error = %e, "watch-list lookup failed during connect");
                return (ConnectOutcome::FailedNotFollowing, None);
            }
        }

        let target_session = {
            let presence = self.presence().lock().expect("presence lock poisoned");
            presence.session_of(&target)
        };
        let target_handle = match target_session.and_then(|id| self.sessions().get(id)) {
            Some(handle) => handle,
            None => return (ConnectOutcome::FailedNotFound, None),
        };

        // Exactly one side hosts; the target, being told first, does.
        target_handle.send(Message::ConnectTo {
            peer: requester.clone(),
            endpoint: requester_session.endpoint.clone(),
            you_are_host: true,
        });

        tracing::debug!(requester = %requester, target = %target, "brokered direct connection");
        (ConnectOutcome::Success, Some(target_handle.endpoint.clone()))
    }
}
