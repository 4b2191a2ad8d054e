//! Server error types.

use std::io;

use parley_proto::{DecodeError, FramingError, RoomId};
use thiserror::Error;

/// Errors that can occur in the server.
///
/// Everything except `Bind` is scoped to a single connection: the connection
/// is torn down and the server keeps serving everyone else.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket.
    ///
    /// Fatal at startup. Fix the address or free the port and restart.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested
        address: String,
        /// Underlying socket error
        source: io::Error,
    },

    /// Socket I/O outside of framing (accept, local address, shutdown).
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// Stream broke or carried a malformed frame.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Frame payload was not a valid envelope.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Envelope was not valid in the session's current state.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
}

/// Envelope received in a state where it is not allowed.
///
/// Always closes the offending connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Anything but `CONNECT` before joining.
    #[error("{received} before CONNECT")]
    NotJoined {
        /// Wire tag of the offending envelope
        received: &'static str,
    },

    /// A second `CONNECT` on a connection that already joined.
    #[error("CONNECT while already joined to {room}")]
    AlreadyJoined {
        /// Room the connection is in
        room: RoomId,
    },

    /// `MESSAGE` or `DISCONNECT` addressed to a room the peer is not in.
    #[error("{received} for room {actual}, joined to {expected}")]
    RoomMismatch {
        /// Wire tag of the offending envelope
        received: &'static str,
        /// Room the connection is in
        expected: RoomId,
        /// Room named by the envelope
        actual: RoomId,
    },

    /// A server-only envelope sent by a client.
    #[error("{received} is server-originated")]
    ServerOnly {
        /// Wire tag of the offending envelope
        received: &'static str,
    },

    /// Anything after the session closed.
    #[error("{received} after session closed")]
    Closed {
        /// Wire tag of the offending envelope
        received: &'static str,
    },
}
