//! Typed envelopes carried inside frames.
//!
//! An envelope is a JSON object tagged by its `type` field:
//!
//! ```text
//! {"type":"CONNECT",    "sender":"ana", "chat_id":"<room id>"}
//! {"type":"DISCONNECT", "sender":"ana", "chat_id":"<room id>"}
//! {"type":"MESSAGE",    "sender":"ana", "chat_id":"<room id>", "contents":"<token>"}
//! {"type":"JOINED",     "chat_id":"<room id>", "participants":2, "total_online":5, "status":"JOINED"}
//! ```
//!
//! `JOINED` is only ever produced by the server, as the reply to a `CONNECT`.
//!
//! # Invariants
//!
//! - Closed Set: every consumer matches exhaustively on [`Envelope`]. An
//!   unknown `type` is rejected with [`DecodeError::UnknownType`], never
//!   mapped to a fallback variant.
//! - Opaque Contents: `contents` is a ciphertext token. Nothing in this crate
//!   or the server reads or rewrites it.
//! - Room Identity: `chat_id` is always the derived room identifier, never a
//!   human-readable room name.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

/// Derived room identifier, the server's only notion of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap an already-derived identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Membership change announced by a client (`CONNECT` / `DISCONNECT`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Display name chosen by the client
    pub sender: String,
    /// Room the client is joining or leaving
    pub chat_id: RoomId,
}

/// Encrypted chat line (`MESSAGE`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name chosen by the client
    pub sender: String,
    /// Room the message is addressed to
    pub chat_id: RoomId,
    /// Ciphertext token, forwarded verbatim by the server
    pub contents: String,
}

/// Server reply to a successful `CONNECT` (`JOINED`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    /// Room that was joined
    pub chat_id: RoomId,
    /// Members of the room including the joiner
    pub participants: u64,
    /// Members across all rooms on this server
    pub total_online: u64,
    /// Whether the join created the room entry
    pub status: JoinStatus,
}

/// Outcome reported in a [`JoinAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinStatus {
    /// First member; the room entry did not exist before
    Created,
    /// Room already existed
    Joined,
}

/// Every message kind on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Envelope {
    /// Client joins a room
    Connect(Presence),
    /// Client leaves a room
    Disconnect(Presence),
    /// Encrypted chat line
    #[serde(rename = "MESSAGE")]
    Chat(ChatMessage),
    /// Server acknowledges a join
    Joined(JoinAck),
}

impl Envelope {
    /// Every `type` tag this protocol defines.
    pub const TYPES: [&'static str; 4] = ["CONNECT", "DISCONNECT", "MESSAGE", "JOINED"];

    /// `CONNECT` envelope.
    pub fn connect(sender: impl Into<String>, chat_id: RoomId) -> Self {
        Self::Connect(Presence { sender: sender.into(), chat_id })
    }

    /// `DISCONNECT` envelope.
    pub fn disconnect(sender: impl Into<String>, chat_id: RoomId) -> Self {
        Self::Disconnect(Presence { sender: sender.into(), chat_id })
    }

    /// `MESSAGE` envelope carrying an already-encrypted token.
    pub fn chat(sender: impl Into<String>, chat_id: RoomId, contents: impl Into<String>) -> Self {
        Self::Chat(ChatMessage { sender: sender.into(), chat_id, contents: contents.into() })
    }

    /// Wire tag for this variant.
    pub const fn type_tag(&self) -> &'static str {
        match self {
            Self::Connect(_) => "CONNECT",
            Self::Disconnect(_) => "DISCONNECT",
            Self::Chat(_) => "MESSAGE",
            Self::Joined(_) => "JOINED",
        }
    }

    /// Room this envelope is addressed to.
    pub fn chat_id(&self) -> &RoomId {
        match self {
            Self::Connect(p) | Self::Disconnect(p) => &p.chat_id,
            Self::Chat(m) => &m.chat_id,
            Self::Joined(ack) => &ack.chat_id,
        }
    }

    /// Sending client's display name. `None` for server-originated envelopes.
    pub fn sender(&self) -> Option<&str> {
        match self {
            Self::Connect(p) | Self::Disconnect(p) => Some(&p.sender),
            Self::Chat(m) => Some(&m.sender),
            Self::Joined(_) => None,
        }
    }

    /// Serialize to a frame payload.
    pub fn encode(&self) -> Bytes {
        let Ok(json) = serde_json::to_vec(self) else {
            unreachable!("envelopes hold only strings and integers, which always serialize");
        };
        Bytes::from(json)
    }

    /// Parse a frame payload.
    ///
    /// # Errors
    ///
    /// - `DecodeError::Malformed` if the payload is not a JSON object with
    ///   the fields its type requires
    /// - `DecodeError::MissingType` if there is no string `type` field
    /// - `DecodeError::UnknownType` if `type` is not one of [`Self::TYPES`]
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;

        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingType)?;
        if !Self::TYPES.contains(&tag) {
            return Err(DecodeError::UnknownType(tag.to_owned()));
        }

        Ok(serde_json::from_value(value)?)
    }
}
