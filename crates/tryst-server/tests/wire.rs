//! Wire-level tests with hand-built frames.
//!
//! The client library validates identities before they ever reach a
//! socket, so these tests speak the framed protocol directly to cover
//! what a hostile or buggy peer can put on the wire: empty identities
//! (serde's transparent representation cannot reject them, only the
//! server boundary can) and replies that do not match their request.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use tryst_client::Client;
use tryst_server::identity::PinningResolver;
use tryst_server::transport::RendezvousListener;
use tryst_server::{Router, ServerConfig};
use tryst_shared::protocol::{InvitationResponse, Message, Packet, WatchAction};
use tryst_shared::{GroupId, Identity, Person, Status};
use tryst_store::{MemoryWatchListStore, WatchListStore};

async fn spawn_server() -> std::net::SocketAddr {
    let store: Arc<dyn WatchListStore> = Arc::new(MemoryWatchListStore::new());
    let resolver = Arc::new(PinningResolver::new());
    let router = Arc::new(Router::new(store, resolver));

    let config = ServerConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let listener = RendezvousListener::bind(router, &config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());
    addr
}

fn id(s: &str) -> Identity {
    Identity::new(s).unwrap()
}

/// Build an identity the way the wire does: straight deserialization,
/// bypassing the constructor's validation.
fn wire_identity(s: &str) -> Identity {
    bincode::deserialize(&bincode::serialize(&s.to_string()).unwrap()).unwrap()
}

fn person(name: &str) -> Person {
    Person::with_nickname(id(name), format!("{name}-nick"))
}

async fn send_frame(stream: &mut TcpStream, packet: &Packet) {
    let body = packet.to_bytes().unwrap();
    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    stream.write_all(&buf).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> Packet {
    timeout(Duration::from_secs(5), async {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut body).await.unwrap();
        Packet::from_bytes(&body).unwrap()
    })
    .await
    .expect("timed out waiting for frame")
}

#[tokio::test]
async fn test_reset_with_empty_identity_leaves_store_untouched() {
    let addr = spawn_server().await;

    let mut eve = TcpStream::connect(addr).await.unwrap();
    send_frame(
        &mut eve,
        &Packet::push(
            1,
            Message::PersonAnnounce {
                person: person("eve"),
            },
        ),
    )
    .await;

    // Nothing stored yet, so the server asks for a replay.
    let packet = read_frame(&mut eve).await;
    assert!(matches!(packet.message, Message::RequestWatchList));

    send_frame(
        &mut eve,
        &Packet::push(
            2,
            Message::WatchListDelta {
                action: WatchAction::Add,
                people: vec![person("bob")],
            },
        ),
    )
    .await;

    // A reset carrying an empty identity must be rejected whole, not
    // clear the stored set and then fail.
    send_frame(
        &mut eve,
        &Packet::push(
            3,
            Message::WatchListDelta {
                action: WatchAction::Reset,
                people: vec![
                    person("carol"),
                    Person {
                        identity: wire_identity(""),
                        nickname: String::new(),
                        status: Status::Online,
                    },
                ],
            },
        ),
    )
    .await;

    // Request round trip as an ordering barrier: once the reply is
    // back, both deltas have been processed.
    send_frame(
        &mut eve,
        &Packet::push(
            4,
            Message::Search {
                nickname: "barrier-no-such-nickname".to_string(),
            },
        ),
    )
    .await;
    let packet = read_frame(&mut eve).await;
    assert_eq!(packet.in_reply_to, Some(4));
    drop(eve);

    // Reconnect: the stored set must still be exactly {bob}.
    let mut eve = TcpStream::connect(addr).await.unwrap();
    send_frame(
        &mut eve,
        &Packet::push(
            1,
            Message::PersonAnnounce {
                person: person("eve"),
            },
        ),
    )
    .await;

    let packet = read_frame(&mut eve).await;
    match packet.message {
        Message::WatchListDelta { action, people } => {
            assert_eq!(action, WatchAction::Reset);
            let names: Vec<&str> = people.iter().map(|p| p.identity.as_str()).collect();
            assert_eq!(names, vec!["bob"]);
        }
        other => panic!("expected the stored watch-list back, got {other:?}"),
    }
}

#[tokio::test]
async fn test_announce_with_empty_identity_is_ignored() {
    let addr = spawn_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_frame(
        &mut stream,
        &Packet::push(
            1,
            Message::PersonAnnounce {
                person: Person {
                    identity: wire_identity("   "),
                    nickname: "ghost".to_string(),
                    status: Status::Online,
                },
            },
        ),
    )
    .await;

    // The announce is dropped, so the session stays unbound and the
    // next operation closes it instead of being attributed to anyone.
    send_frame(&mut stream, &Packet::push(2, Message::CreateGroup)).await;

    let mut probe = [0u8; 1];
    let closed = timeout(Duration::from_secs(5), stream.read(&mut probe))
        .await
        .expect("timed out waiting for close");
    assert_eq!(closed.unwrap(), 0, "expected the server to close the session");
}

#[tokio::test]
async fn test_invite_reply_for_wrong_group_is_an_error() {
    let addr = spawn_server().await;
    let (alice, _alice_rx) = Client::connect(addr, person("alice")).await.unwrap();

    let mut eve = TcpStream::connect(addr).await.unwrap();
    send_frame(
        &mut eve,
        &Packet::push(
            1,
            Message::PersonAnnounce {
                person: person("eve"),
            },
        ),
    )
    .await;

    // Barriers on both sessions: eve's announce and alice's watch must
    // both be applied before the invite consults them.
    send_frame(
        &mut eve,
        &Packet::push(
            2,
            Message::Search {
                nickname: "barrier-no-such-nickname".to_string(),
            },
        ),
    )
    .await;
    loop {
        if read_frame(&mut eve).await.in_reply_to == Some(2) {
            break;
        }
    }
    alice.watch(person("eve")).unwrap();
    alice.search("barrier-no-such-nickname").await.unwrap();

    let group = alice.create_group().await.unwrap();

    // Eve answers the invitation naming a different group; the server
    // must not take that as consent for the real one.
    let group_id = group.id;
    let (response, ()) = tokio::join!(alice.invite(group_id, id("eve")), async {
        loop {
            let packet = read_frame(&mut eve).await;
            if let Message::GroupInvite { group } = packet.message {
                assert_eq!(group.id, group_id);
                send_frame(
                    &mut eve,
                    &Packet::reply(
                        3,
                        packet.seq,
                        Message::GroupInviteResponse {
                            group_id: GroupId(group_id.0 + 1),
                            response: InvitationResponse::Accepted,
                        },
                    ),
                )
                .await;
                break;
            }
        }
    });
    assert_eq!(response.unwrap(), InvitationResponse::Error);

    // The mismatched consent must not have joined eve to the group.
    let (response, ()) = tokio::join!(alice.invite(group_id, id("eve")), async {
        loop {
            let packet = read_frame(&mut eve).await;
            if let Message::GroupInvite { .. } = packet.message {
                send_frame(
                    &mut eve,
                    &Packet::reply(
                        4,
                        packet.seq,
                        Message::GroupInviteResponse {
                            group_id,
                            response: InvitationResponse::Accepted,
                        },
                    ),
                )
                .await;
                break;
            }
        }
    });
    assert_eq!(response.unwrap(), InvitationResponse::Accepted);
}
