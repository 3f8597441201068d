//! Framed TCP transport.
//!
//! Packets travel as 4-byte big-endian length prefixes followed by a
//! bincode body. One task per connection reads and dispatches packets
//! in order; a companion writer task drains the session's outbound
//! queue. Everything above this module works in terms of
//! [`Packet`]s and never sees a socket.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use tryst_shared::{Endpoint, Packet};

use crate::error::ServerError;
use crate::router::Router;
use crate::session::{Outbound, SessionHandle};
use crate::ServerConfig;

/// Bound rendezvous listener, ready to run.
pub struct RendezvousListener {
    listener: TcpListener,
    router: Arc<Router>,
    max_frame_size: usize,
}

impl RendezvousListener {
    /// Bind the listener described by `config`.
    pub async fn bind(router: Arc<Router>, config: &ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "rendezvous listener bound");
        Ok(Self {
            listener,
            router,
            max_frame_size: config.max_frame_size,
        })
    }

    /// The actual bound address (port 0 in the config resolves here).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per session.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let (stream, _) = self.listener.accept().await?;
            let router = self.router.clone();
            let max_frame_size = self.max_frame_size;
            tokio::spawn(async move {
                handle_connection(router, stream, max_frame_size).await;
            });
        }
    }
}

async fn handle_connection(router: Arc<Router>, stream: TcpStream, max_frame_size: usize) {
    let endpoint = match stream.peer_addr() {
        Ok(addr) => Endpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "connection lost before accept completed");
            return;
        }
    };

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let session = SessionHandle::new(endpoint, outbound_tx);

    router.register_session(session.clone());
    tracing::info!(session = %session.id, peer = %session.endpoint, "session connected");

    let writer = tokio::spawn(write_loop(write_half, outbound_rx));

    if let Err(e) = read_loop(&router, &session, read_half, max_frame_size).await {
        tracing::debug!(session = %session.id, error = %e, "session read loop ended");
    }

    router.handle_disconnect(&session);
    tracing::info!(session = %session.id, "session disconnected");

    // Dropping the last outbound sender stops the writer.
    drop(session);
    let _ = writer.await;
}

/// Read frames and dispatch them in order. Per-session ordering falls
/// out of this loop being the only reader for the session.
async fn read_loop(
    router: &Router,
    session: &SessionHandle,
    mut read_half: OwnedReadHalf,
    max_frame_size: usize,
) -> Result<(), ServerError> {
    loop {
        let len = match read_half.read_u32().await {
            Ok(len) => len as usize,
            // Clean EOF between frames is a normal close.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if len > max_frame_size {
            return Err(ServerError::FrameTooLarge {
                size: len,
                max: max_frame_size,
            });
        }

        let mut body = vec![0u8; len];
        read_half.read_exact(&mut body).await?;

        let packet = Packet::from_bytes(&body)?;
        router.handle_packet(session, packet).await;
    }
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let mut buf = BytesMut::new();
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Packet(packet) => {
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
            Outbound::Close(reason) => {
                tracing::info!(reason = %reason, "closing session");
                let _ = write_half.shutdown().await;
                break;
            }
        }
    }
}
