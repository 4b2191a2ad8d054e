//! Per-connection session state machine.
//!
//! Decides what a connection's envelopes mean without doing any I/O. Each
//! call returns [`SessionAction`]s for the runtime to execute against the
//! room registry and the peer's outbound queue, which keeps every transition
//! testable without sockets.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────┐  CONNECT  ┌────────┐  DISCONNECT / abort  ┌────────┐
//! │ Awaiting │──────────>│ Joined │─────────────────────>│ Closed │
//! └──────────┘           └────────┘                      └────────┘
//!       │                  │    ↺ MESSAGE                     ^
//!       │ violation/abort  │                                  │
//!       └──────────────────┼──────────────────────────────────┘
//! ```
//!
//! A violation returns `Err` and leaves the state untouched; the runtime
//! then calls [`ConnectionSession::abort`], which performs the same cleanup
//! as a read failure.

use parley_proto::{Envelope, RoomId};

use crate::{error::ProtocolViolation, registry::PeerId};

/// Actions returned by the session state machine.
///
/// The runtime executes these in order:
/// - `Join`: add the peer to the registry and acknowledge with `JOINED`
/// - `Forward`: broadcast to the room, excluding this peer
/// - `Leave`: remove the peer from the registry
/// - `Close`: stop reading and tear the connection down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Add this peer to `room` under `sender`
    Join {
        /// Room to join
        room: RoomId,
        /// Display name
        sender: String,
    },

    /// Deliver `envelope` to every other member of `room`
    Forward {
        /// Room to broadcast to
        room: RoomId,
        /// Envelope to deliver unchanged
        envelope: Envelope,
    },

    /// Remove this peer from `room`
    Leave {
        /// Room to leave
        room: RoomId,
    },

    /// Close the connection
    Close {
        /// Reason for closing, for logs
        reason: String,
    },
}

/// Session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, waiting for `CONNECT`
    Awaiting,
    /// Member of a room
    Joined {
        /// Room the peer joined
        room: RoomId,
        /// Display name from `CONNECT`
        sender: String,
    },
    /// Terminal
    Closed,
}

/// Server side of one client connection.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    peer: PeerId,
    state: SessionState,
}

impl ConnectionSession {
    /// Create a session in [`SessionState::Awaiting`].
    pub fn new(peer: PeerId) -> Self {
        Self { peer, state: SessionState::Awaiting }
    }

    /// Connection this session belongs to.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Room the session has joined. `None` unless [`SessionState::Joined`].
    pub fn room(&self) -> Option<&RoomId> {
        match &self.state {
            SessionState::Joined { room, .. } => Some(room),
            SessionState::Awaiting | SessionState::Closed => None,
        }
    }

    /// Whether the session reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Process one envelope received from the client.
    ///
    /// # Errors
    ///
    /// - `ProtocolViolation::NotJoined` for anything but `CONNECT` while
    ///   awaiting
    /// - `ProtocolViolation::AlreadyJoined` for a second `CONNECT`
    /// - `ProtocolViolation::RoomMismatch` for `MESSAGE`/`DISCONNECT`
    ///   addressed to another room
    /// - `ProtocolViolation::ServerOnly` for `JOINED`
    /// - `ProtocolViolation::Closed` for anything after close
    pub fn handle(&mut self, envelope: Envelope) -> Result<Vec<SessionAction>, ProtocolViolation> {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        let (next, result) = Self::transition(state, envelope);
        self.state = next;
        result
    }

    fn transition(
        state: SessionState,
        envelope: Envelope,
    ) -> (SessionState, Result<Vec<SessionAction>, ProtocolViolation>) {
        let received = envelope.type_tag();

        match (state, envelope) {
            (state, Envelope::Joined(_)) => {
                (state, Err(ProtocolViolation::ServerOnly { received }))
            },

            (SessionState::Closed, _) => {
                (SessionState::Closed, Err(ProtocolViolation::Closed { received }))
            },

            (SessionState::Awaiting, Envelope::Connect(presence)) => {
                let room = presence.chat_id.clone();
                let sender = presence.sender.clone();
                let actions = vec![
                    SessionAction::Join { room: room.clone(), sender: sender.clone() },
                    SessionAction::Forward {
                        room: room.clone(),
                        envelope: Envelope::Connect(presence),
                    },
                ];
                (SessionState::Joined { room, sender }, Ok(actions))
            },

            (SessionState::Awaiting, Envelope::Disconnect(_) | Envelope::Chat(_)) => {
                (SessionState::Awaiting, Err(ProtocolViolation::NotJoined { received }))
            },

            (SessionState::Joined { room, sender }, Envelope::Connect(_)) => {
                let violation = ProtocolViolation::AlreadyJoined { room: room.clone() };
                (SessionState::Joined { room, sender }, Err(violation))
            },

            (SessionState::Joined { room, sender }, envelope) if envelope.chat_id() != &room => {
                let violation = ProtocolViolation::RoomMismatch {
                    received,
                    expected: room.clone(),
                    actual: envelope.chat_id().clone(),
                };
                (SessionState::Joined { room, sender }, Err(violation))
            },

            (SessionState::Joined { room, sender }, Envelope::Chat(message)) => {
                let forward =
                    SessionAction::Forward { room: room.clone(), envelope: Envelope::Chat(message) };
                (SessionState::Joined { room, sender }, Ok(vec![forward]))
            },

            (SessionState::Joined { room, .. }, Envelope::Disconnect(presence)) => {
                let actions = vec![
                    SessionAction::Leave { room: room.clone() },
                    SessionAction::Forward { room, envelope: Envelope::Disconnect(presence) },
                    SessionAction::Close { reason: "client disconnected".to_string() },
                ];
                (SessionState::Closed, Ok(actions))
            },
        }
    }

    /// Tear the session down after a read, decode or protocol failure.
    ///
    /// A joined peer leaves its room and the room hears a `DISCONNECT` on
    /// its behalf. Calling this on a closed session returns no actions.
    pub fn abort(&mut self, reason: impl Into<String>) -> Vec<SessionAction> {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        let close = SessionAction::Close { reason: reason.into() };

        match previous {
            SessionState::Awaiting => vec![close],
            SessionState::Joined { room, sender } => vec![
                SessionAction::Leave { room: room.clone() },
                SessionAction::Forward {
                    room: room.clone(),
                    envelope: Envelope::disconnect(sender, room),
                },
                close,
            ],
            SessionState::Closed => Vec::new(),
        }
    }
}
