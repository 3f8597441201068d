//! # tryst-client
//!
//! Client library for the Tryst rendezvous network.
//!
//! A [`Client`] owns one connection to the server and keeps the local
//! mirrors (watch-list, group view) synchronized with it through the
//! same delta vocabulary the server uses. Everything the server pushes
//! surfaces on a typed [`ClientEvent`] stream; request/response calls
//! (search, group creation, invitations, connection brokering) are
//! plain async methods.

pub mod events;
pub mod mirror;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};

use tryst_shared::protocol::{
    ConnectOutcome, InvitationResponse, Message, Packet, WatchAction,
};
use tryst_shared::{Endpoint, Group, GroupId, Identity, Person, SocialError};

pub use events::ClientEvent;
pub use mirror::{GroupChange, GroupView, WatchChange, WatchListMirror};

/// Largest frame the client will accept.
const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("social error: {0}")]
    Social(#[from] SocialError),

    #[error("connection to the server is gone")]
    Disconnected,

    #[error("server sent an unexpected reply")]
    UnexpectedReply,
}

/// Outbound instruction for the writer task.
enum Outbound {
    Packet(Packet),
    Close,
}

/// Correlated packet plumbing shared by the API surface and the read
/// loop.
#[derive(Clone)]
struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    next_seq: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Message>>>>,
}

impl Connection {
    fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            outbound,
            next_seq: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, message: Message) {
        let packet = Packet::push(self.next_seq(), message);
        if self.outbound.send(Outbound::Packet(packet)).is_err() {
            tracing::debug!("dropping send on closed connection");
        }
    }

    fn reply(&self, request_seq: u64, message: Message) {
        let packet = Packet::reply(self.next_seq(), request_seq, message);
        if self.outbound.send(Outbound::Packet(packet)).is_err() {
            tracing::debug!("dropping reply on closed connection");
        }
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    async fn request(&self, message: Message) -> Result<Message, ClientError> {
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
            return Err(ClientError::Disconnected);
        }

        rx.await.map_err(|_| ClientError::Disconnected)
    }

    fn resolve_reply(&self, request_seq: u64, message: Message) -> bool {
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

    fn fail_pending(&self) {
        self.pending.lock().expect("pending lock poisoned").clear();
    }
}

struct Shared {
    conn: Connection,
    watch: Mutex<WatchListMirror>,
    groups: Mutex<GroupView>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

/// Handle to one authenticated connection to the rendezvous server.
pub struct Client {
    persona: Mutex<Person>,
    shared: Arc<Shared>,
}

impl Client {
    /// Connect, announce `persona`, and return the client together
    /// with its event stream.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        persona: Person,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        persona.identity.validate()?;

        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            conn: Connection::new(outbound_tx),
            watch: Mutex::new(WatchListMirror::new()),
            groups: Mutex::new(GroupView::new(persona.identity.clone())),
            events: events_tx,
        });

        tokio::spawn(write_loop(write_half, outbound_rx));
        tokio::spawn(read_loop(shared.clone(), read_half));

        let client = Self {
            persona: Mutex::new(persona),
            shared,
        };
        client.announce();

        Ok((client, events_rx))
    }

    /// Current persona snapshot.
    pub fn persona(&self) -> Person {
        self.persona.lock().expect("persona lock poisoned").clone()
    }

    /// Re-announce the current persona.
    pub fn announce(&self) {
        let person = self.persona();
        self.shared.conn.send(Message::PersonAnnounce { person });
    }

    /// Change nickname and push the update to the server.
    pub fn set_nickname(&self, nickname: impl Into<String>) {
        {
            let mut persona = self.persona.lock().expect("persona lock poisoned");
            persona.nickname = nickname.into();
        }
        self.announce();
    }

    /// Change status and push the update to the server.
    pub fn set_status(&self, status: tryst_shared::Status) {
        {
            let mut persona = self.persona.lock().expect("persona lock poisoned");
            persona.status = status;
        }
        self.announce();
    }

    // -----------------------------------------------------------------
    // Watch-list
    // -----------------------------------------------------------------

    /// Start watching a person. Broadcasts the addition to the server
    /// when it changed the local replica.
    ///
    /// The mirror lock is held across the send so a concurrent replay
    /// cannot slip an older snapshot in between mutation and delta.
    pub fn watch(&self, person: Person) -> Result<(), ClientError> {
        person.identity.validate()?;

        let mut watch = self.shared.watch.lock().expect("watch lock poisoned");
        if watch.insert_local(person.clone()) {
            self.shared.conn.send(Message::WatchListDelta {
                action: WatchAction::Add,
                people: vec![person],
            });
        }
        Ok(())
    }

    /// Stop watching an identity.
    pub fn unwatch(&self, identity: &Identity) -> Result<(), ClientError> {
        identity.validate()?;

        let mut watch = self.shared.watch.lock().expect("watch lock poisoned");
        if let Some(person) = watch.remove_local(identity) {
            self.shared.conn.send(Message::WatchListDelta {
                action: WatchAction::Remove,
                people: vec![person],
            });
        }
        Ok(())
    }

    /// Push the full local watch-list as a reset. Sent automatically
    /// when the server requests a replay.
    pub fn replay_watch_list(&self) {
        let watch = self.shared.watch.lock().expect("watch lock poisoned");
        self.shared.conn.send(Message::WatchListDelta {
            action: WatchAction::Reset,
            people: watch.snapshot(),
        });
    }

    /// Snapshot of the watch-list replica.
    pub fn watch_list(&self) -> Vec<Person> {
        self.shared
            .watch
            .lock()
            .expect("watch lock poisoned")
            .snapshot()
    }

    /// Search for people whose nickname contains `nickname`.
    pub async fn search(&self, nickname: &str) -> Result<Vec<Person>, ClientError> {
        if nickname.trim().is_empty() {
            return Err(SocialError::InvalidArgument("nickname must not be empty").into());
        }

        let reply = self
            .shared
            .conn
            .request(Message::Search {
                nickname: nickname.to_string(),
            })
            .await?;
        match reply {
            Message::SearchResult { results } => Ok(results),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    // -----------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------

    /// Ask the server for a fresh group with us as sole participant.
    pub async fn create_group(&self) -> Result<Group, ClientError> {
        let reply = self.shared.conn.request(Message::CreateGroup).await?;
        match reply {
            Message::GroupCreated { group } => {
                self.shared
                    .groups
                    .lock()
                    .expect("group lock poisoned")
                    .track(group.clone());
                Ok(group)
            }
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Invite `invitee` into a group; resolves to the invitee's actual
    /// response.
    pub async fn invite(
        &self,
        group_id: GroupId,
        invitee: Identity,
    ) -> Result<InvitationResponse, ClientError> {
        invitee.validate()?;

        let reply = self
            .shared
            .conn
            .request(Message::InviteToGroup { group_id, invitee })
            .await?;
        match reply {
            Message::InviteResult { response } => Ok(response),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Leave a group and drop it from the local view.
    pub fn leave_group(&self, group_id: GroupId) {
        self.shared
            .groups
            .lock()
            .expect("group lock poisoned")
            .untrack(group_id);
        self.shared.conn.send(Message::LeaveGroup { group_id });
    }

    /// Send a chat line to a group. The server fills in the sender.
    pub fn send_text(&self, group_id: GroupId, text: impl Into<String>) {
        self.shared.conn.send(Message::Text {
            group_id,
            sender: None,
            text: text.into(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Snapshot of the group view.
    pub fn groups(&self) -> Vec<Group> {
        self.shared
            .groups
            .lock()
            .expect("group lock poisoned")
            .snapshot()
    }

    // -----------------------------------------------------------------
    // Brokering and relay
    // -----------------------------------------------------------------

    /// Ask the server to broker a direct connection to `target`.
    ///
    /// On success the returned endpoint is the peer's rendezvous
    /// address; the peer is told to host and receives ours.
    pub async fn connect_to(
        &self,
        target: Identity,
    ) -> Result<(ConnectOutcome, Option<Endpoint>), ClientError> {
        target.validate()?;

        let reply = self
            .shared
            .conn
            .request(Message::ConnectRequest { target })
            .await?;
        match reply {
            Message::ConnectResult { result, endpoint } => Ok((result, endpoint)),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Relay an opaque payload to another identity. Best effort; the
    /// server drops it when the target is offline.
    pub fn forward(&self, target: Identity, protocol: u16, kind: u16, payload: Vec<u8>) {
        self.shared.conn.send(Message::Forward {
            target,
            protocol,
            kind,
            payload,
        });
    }

    /// Close the connection. The server observes a clean disconnect and
    /// marks us Offline.
    pub fn close(&self) {
        self.shared.conn.close();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // The read task keeps the shared state alive, so the socket
        // must be closed explicitly when the handle goes away.
        self.shared.conn.close();
    }
}

// ---------------------------------------------------------------------
// Connection tasks
// ---------------------------------------------------------------------

async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let mut buf = BytesMut::new();
    while let Some(outbound) = rx.recv().await {
        let packet = match outbound {
            Outbound::Packet(packet) => packet,
            Outbound::Close => break,
        };
        let body = match packet.to_bytes() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode outbound packet");
                continue;
            }
        };
        buf.clear();
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        if write_half.write_all(&buf).await.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn read_loop(shared: Arc<Shared>, mut read_half: OwnedReadHalf) {
    loop {
        let len = match read_half.read_u32().await {
            Ok(len) => len as usize,
            Err(_) => break,
        };
        if len > MAX_FRAME_SIZE {
            tracing::error!(len, "oversized frame from server");
            break;
        }

        let mut body = vec![0u8; len];
        if read_half.read_exact(&mut body).await.is_err() {
            break;
        }

        match Packet::from_bytes(&body) {
            Ok(packet) => handle_packet(&shared, packet),
            Err(e) => {
                tracing::error!(error = %e, "undecodable frame from server");
                break;
            }
        }
    }

    shared.conn.fail_pending();
    tracing::info!("server connection closed");
}

fn handle_packet(shared: &Arc<Shared>, packet: Packet) {
    if let Some(request_seq) = packet.in_reply_to {
        if !shared.conn.resolve_reply(request_seq, packet.message) {
            tracing::debug!(request_seq, "reply with no pending request dropped");
        }
        return;
    }

    let seq = packet.seq;
    match packet.message {
        Message::PersonAnnounce { person } => {
            let change = {
                let mut watch = shared.watch.lock().expect("watch lock poisoned");
                watch.apply_person(person)
            };
            if let Some(change) = change {
                emit(shared, ClientEvent::WatchChanged(change));
            }
        }

        Message::RequestWatchList => {
            // Lock held across the send; see `Client::watch`.
            {
                let watch = shared.watch.lock().expect("watch lock poisoned");
                shared.conn.send(Message::WatchListDelta {
                    action: WatchAction::Reset,
                    people: watch.snapshot(),
                });
            }
            emit(shared, ClientEvent::WatchListRequested);
        }

        Message::WatchListDelta { action, people } => {
            let changes = {
                let mut watch = shared.watch.lock().expect("watch lock poisoned");
                watch.apply_delta(action, people)
            };
            for change in changes {
                emit(shared, ClientEvent::WatchChanged(change));
            }
        }

        Message::GroupUpdate { group } => {
            let change = {
                let mut groups = shared.groups.lock().expect("group lock poisoned");
                groups.apply_update(group)
            };
            if change.left || !change.added.is_empty() || !change.removed.is_empty() {
                emit(shared, ClientEvent::GroupChanged(change));
            }
        }

        Message::GroupInvite { group } => {
            let (responder, response_rx) = oneshot::channel();
            let group_id = group.id;
            emit(shared, ClientEvent::InviteReceived { group, responder });

            // Answer on a separate task so a slow application does not
            // stall the read loop.
            let conn = shared.conn.clone();
            tokio::spawn(async move {
                let response = response_rx
                    .await
                    .unwrap_or(InvitationResponse::Rejected);
                conn.reply(seq, Message::GroupInviteResponse { group_id, response });
            });
        }

        Message::Text {
            group_id,
            sender,
            text,
            timestamp,
        } => match sender {
            Some(sender) => {
                emit(
                    shared,
                    ClientEvent::TextReceived {
                        group_id,
                        sender,
                        text,
                        timestamp,
                    },
                );
            }
            None => {
                tracing::warn!(group = %group_id, "text without sender dropped");
            }
        },

        Message::ConnectTo {
            peer,
            endpoint,
            you_are_host,
        } => {
            emit(
                shared,
                ClientEvent::StartingConnection {
                    peer,
                    endpoint,
                    you_are_host,
                },
            );
        }

        Message::Forward {
            target: source,
            protocol,
            kind,
            payload,
        } => {
            emit(
                shared,
                ClientEvent::Forwarded {
                    source,
                    protocol,
                    kind,
                    payload,
                },
            );
        }

        other => {
            tracing::debug!(message = ?other, "unexpected server push dropped");
        }
    }
}

fn emit(shared: &Arc<Shared>, event: ClientEvent) {
    if shared.events.send(event).is_err() {
        tracing::debug!("event receiver dropped");
    }
}
