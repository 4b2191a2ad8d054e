//! Parley relay server.
//!
//! Accepts TCP connections, reads length-prefixed envelopes and relays
//! encrypted chat lines between members of the same room. The server never
//! holds a room key: it routes on the derived room identifier and forwards
//! `MESSAGE` contents byte-for-byte.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!  TcpStream ───> │ read half → ConnectionSession │ ── actions ──┐
//!                 └──────────────────────────────┘               │
//!                                                                ▼
//!                                               Arc<Mutex<RoomRegistry>>
//!                                                                │ try_send
//!                 ┌──────────────────────────────┐               │
//!  TcpStream <─── │ write half ← writer task     │ <── mpsc ─────┘
//!                 └──────────────────────────────┘
//! ```
//!
//! One task per connection reads frames and feeds them to the pure
//! [`ConnectionSession`]; the returned [`SessionAction`]s are executed
//! against the shared [`RoomRegistry`]. A second task per connection drains
//! that peer's bounded outbound queue into the socket, so a broadcast never
//! waits on another peer's network.
//!
//! # Components
//!
//! - [`ConnectionSession`]: per-connection state machine (pure logic, no I/O)
//! - [`RoomRegistry`]: room membership and fan-out
//! - [`Server`]: runtime that owns the listener and executes actions

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod registry;
mod session;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
pub use error::{ProtocolViolation, ServerError};
use parley_proto::{Envelope, FrameCodec, FramingError, JoinAck, JoinStatus, RoomId};
pub use registry::{BroadcastReport, JoinOutcome, Peer, PeerId, RoomRegistry};
pub use session::{ConnectionSession, SessionAction, SessionState};
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Mutex, mpsc},
};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5190;

/// Default capacity of each peer's outbound queue, in frames.
pub const DEFAULT_PEER_QUEUE: usize = 256;

/// Registry handle shared by every connection task.
pub type SharedRegistry = Arc<Mutex<RoomRegistry>>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:5190")
    pub bind_address: String,
    /// Frame codec shared by every connection
    pub codec: FrameCodec,
    /// Outbound queue capacity per peer; a full queue drops broadcasts to
    /// that peer
    pub peer_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            codec: FrameCodec::default(),
            peer_queue: DEFAULT_PEER_QUEUE,
        }
    }
}

/// Parley relay server.
pub struct Server {
    listener: TcpListener,
    registry: SharedRegistry,
    config: ServerConfig,
    next_peer: AtomicU64,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the address cannot be bound
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|source| {
            ServerError::Bind { address: config.bind_address.clone(), source }
        })?;

        Ok(Self {
            listener,
            registry: Arc::new(Mutex::new(RoomRegistry::new())),
            config,
            next_peer: AtomicU64::new(1),
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the room registry.
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Run the server, accepting connections until the task is cancelled.
    ///
    /// Accept errors are logged and the loop continues.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            header_width = self.config.codec.header_width(),
            max_payload = self.config.codec.max_payload(),
            "Server listening on {}",
            self.local_addr()?
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let peer = PeerId::new(self.next_peer.fetch_add(1, Ordering::Relaxed));
                    let registry = Arc::clone(&self.registry);
                    let config = self.config.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, peer, registry, config).await
                        {
                            tracing::info!(%peer, %addr, "Connection closed: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

/// Everything the action executor needs about one connection.
struct ConnectionContext {
    peer: PeerId,
    addr: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    registry: SharedRegistry,
}

/// Handle a single TCP connection from accept to teardown.
///
/// Returns the error that ended the connection, or `Ok` for a clean
/// `DISCONNECT` or end-of-stream. The peer has left its room either way.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    peer: PeerId,
    registry: SharedRegistry,
    config: ServerConfig,
) -> Result<(), ServerError> {
    tracing::debug!(%peer, %addr, "New connection");

    let codec = config.codec;
    let (mut reader, writer) = stream.into_split();
    let (outbound, queue) = mpsc::channel(config.peer_queue.max(1));
    let writer_task = tokio::spawn(write_loop(writer, queue, codec));

    let ctx = ConnectionContext { peer, addr, outbound, registry };
    let mut session = ConnectionSession::new(peer);

    let result = read_loop(&mut reader, codec, &mut session, &ctx).await;

    let reason = match &result {
        Ok(()) => "connection closed".to_string(),
        Err(e) => e.to_string(),
    };
    execute_actions(&ctx, session.abort(reason)).await;

    // The registry no longer holds a sender for this peer; dropping ours
    // lets the writer flush what is queued and shut the socket down.
    drop(ctx);
    match writer_task.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => tracing::debug!(%peer, "Writer stopped: {}", e),
        Err(e) => tracing::error!(%peer, "Writer task failed: {}", e),
    }

    tracing::debug!(%peer, %addr, "Connection finished");
    result
}

/// Read envelopes until the session closes or the stream fails.
async fn read_loop(
    reader: &mut OwnedReadHalf,
    codec: FrameCodec,
    session: &mut ConnectionSession,
    ctx: &ConnectionContext,
) -> Result<(), ServerError> {
    loop {
        let payload = match codec.read_frame(reader).await {
            Ok(payload) => payload,
            Err(e) if e.is_clean_close() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let envelope = Envelope::decode(&payload)?;
        let peer = session.peer();
        tracing::trace!(%peer, "Received {}", envelope.type_tag());

        let actions = session.handle(envelope).inspect_err(|violation| {
            tracing::warn!(%peer, addr = %ctx.addr, "Protocol violation: {}", violation);
        })?;

        if execute_actions(ctx, actions).await {
            return Ok(());
        }
    }
}

/// Execute session actions. Returns `true` once a `Close` was executed.
async fn execute_actions(ctx: &ConnectionContext, actions: Vec<SessionAction>) -> bool {
    let mut closed = false;

    for action in actions {
        match action {
            SessionAction::Join { room, sender } => {
                let mut registry = ctx.registry.lock().await;
                let peer = Peer::new(ctx.peer, ctx.addr, sender.as_str(), ctx.outbound.clone());
                let outcome = registry.join(room.clone(), peer);
                let ack = join_ack(room.clone(), outcome, registry.total_members());

                // Enqueued under the lock so the ack precedes any broadcast
                // into this peer's queue.
                if ctx.outbound.try_send(ack.encode()).is_err() {
                    tracing::warn!(peer = %ctx.peer, "Could not enqueue JOINED ack");
                }

                tracing::info!(
                    peer = %ctx.peer,
                    room = room.short(),
                    members = outcome.members,
                    "{} {} room",
                    sender,
                    if outcome.created { "created" } else { "joined" }
                );
            },

            SessionAction::Forward { room, envelope } => {
                let registry = ctx.registry.lock().await;
                let report = registry.broadcast(&room, &envelope, Some(ctx.peer));

                tracing::debug!(
                    peer = %ctx.peer,
                    room = room.short(),
                    delivered = report.delivered,
                    failed = report.failed,
                    "Forwarded {}",
                    envelope.type_tag()
                );
            },

            SessionAction::Leave { room } => {
                let mut registry = ctx.registry.lock().await;
                if registry.leave(&room, ctx.peer) {
                    tracing::info!(
                        peer = %ctx.peer,
                        room = room.short(),
                        members = registry.member_count(&room),
                        "Left room"
                    );
                }
            },

            SessionAction::Close { reason } => {
                tracing::debug!(peer = %ctx.peer, "Closing connection: {}", reason);
                closed = true;
            },
        }
    }

    closed
}

fn join_ack(room: RoomId, outcome: JoinOutcome, total_online: usize) -> Envelope {
    Envelope::Joined(JoinAck {
        chat_id: room,
        participants: outcome.members as u64,
        total_online: total_online as u64,
        status: if outcome.created { JoinStatus::Created } else { JoinStatus::Joined },
    })
}

/// Drain the peer's queue into the socket, then shut the write half down.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    codec: FrameCodec,
) -> Result<(), FramingError> {
    while let Some(payload) = queue.recv().await {
        codec.write_frame(&mut writer, &payload).await?;
    }
    writer.shutdown().await?;
    Ok(())
}
