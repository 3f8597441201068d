//! Live session tracking.
//!
//! A [`SessionHandle`] is the server's view of one connected transport
//! session: an outbound queue, the rendezvous endpoint observed at
//! accept time, and the table of requests awaiting a correlated reply.
//! Handles are cheap to clone; the transport task owns the receiving
//! half of the outbound queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use tryst_shared::{Endpoint, Message, Packet, SocialError};

/// Unique id of a live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// What the transport writer task should do next.
#[derive(Debug)]
pub enum Outbound {
    /// Write this packet to the wire.
    Packet(Packet),
    /// Flush and close the connection, with a diagnostic reason.
    Close(String),
}

/// Handle to one live session.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    /// Rendezvous endpoint observed from the transport's remote
    /// address when the session was accepted.
    pub endpoint: Endpoint,
    outbound: mpsc::UnboundedSender<Outbound>,
    next_seq: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Message>>>>,
}

impl SessionHandle {
    pub fn new(endpoint: Endpoint, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: SessionId::new(),
            endpoint,
            outbound,
            next_seq: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Fire-and-forget send. A closed queue means the session is going
    /// away; the packet is dropped with a log line.
    pub fn send(&self, message: Message) {
        let packet = Packet::push(self.next_seq(), message);
        if self.outbound.send(Outbound::Packet(packet)).is_err() {
            tracing::debug!(session = %self.id, "dropping send to closing session");
        }
    }

    /// Send a reply correlated to an inbound request.
    pub fn reply(&self, request_seq: u64, message: Message) {
        let packet = Packet::reply(self.next_seq(), request_seq, message);
        if self.outbound.send(Outbound::Packet(packet)).is_err() {
            tracing::debug!(session = %self.id, "dropping reply to closing session");
        }
    }

    /// Send a request and await the correlated reply.
    ///
    /// There is no timeout at this layer; expiry is the transport's
    /// concern. The future fails with `PeerUnavailable` when the
    /// session disconnects while the request is in flight.
    pub async fn request(&self, message: Message) -> Result<Message, SocialError> {
        let seq = self.next_seq();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(seq, tx);

        let packet = Packet::push(seq, message);
        if self.outbound.send(Outbound::Packet(packet)).is_err() {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&seq);
            return Err(SocialError::PeerUnavailable(self.id.to_string()));
        }

        rx.await
            .map_err(|_| SocialError::PeerUnavailable(self.id.to_string()))
    }

    /// Route an inbound reply to the request awaiting it. Returns
    /// `false` when nothing was waiting on `request_seq`.
    pub fn resolve_reply(&self, request_seq: u64, message: Message) -> bool {
        let waiter = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&request_seq);
        match waiter {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Ask the transport to flush and close the connection.
    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.outbound.send(Outbound::Close(reason.into()));
    }

    /// Drop every in-flight request so their futures resolve with
    /// `PeerUnavailable`. Called when the session disconnects.
    pub fn fail_pending(&self) {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .clear();
    }
}

/// Table of all live sessions.
#[derive(Clone, Default)]
pub struct SessionTable {
    sessions: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions
            .lock()
            .expect("session table lock poisoned")
            .insert(handle.id, handle);
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .expect("session table lock poisoned")
            .remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .expect("session table lock poisoned")
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .expect("session table lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
