//! Events the client reports while connected.

use std::fmt;

use parley_crypto::CryptoError;

/// Something that happened in the room.
///
/// `Display` renders the line a terminal user sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Decrypted chat line from another member.
    Message {
        /// Sender's display name
        sender: String,
        /// Decrypted text
        text: String,
        /// Sender's clock at encryption time, seconds since the Unix epoch
        sent_at: u64,
    },

    /// Another member joined.
    MemberJoined {
        /// Display name
        sender: String,
    },

    /// Another member left or dropped.
    MemberLeft {
        /// Display name
        sender: String,
    },

    /// A chat line that did not decrypt with our room key. Dropped.
    Undecryptable {
        /// Claimed sender
        sender: String,
        /// Why decryption failed
        error: CryptoError,
    },

    /// The server closed the connection.
    ServerClosed,
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { sender, text, .. } => write!(f, "{sender}: {text}"),
            Self::MemberJoined { sender } => write!(f, "* {sender} joined"),
            Self::MemberLeft { sender } => write!(f, "* {sender} left"),
            Self::Undecryptable { sender, error } => {
                write!(f, "! dropped message from {sender}: {error}")
            },
            Self::ServerClosed => f.write_str("* server closed the connection"),
        }
    }
}
