//! Client error types.

use std::{io, time::Duration};

use parley_proto::{DecodeError, FramingError};
use thiserror::Error;

/// Errors that end a client session.
///
/// Undecryptable messages are not errors; they surface as
/// [`crate::ClientEvent::Undecryptable`] and the session continues.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A login field was empty after trimming.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Input ended before a required value was entered.
    #[error("input closed")]
    InputClosed,

    /// TCP connection was refused or failed.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Address that was dialed
        address: String,
        /// Underlying socket error
        source: io::Error,
    },

    /// TCP connection did not complete in time.
    #[error("timed out connecting to {address} after {after:?}")]
    Timeout {
        /// Address that was dialed
        address: String,
        /// Configured timeout
        after: Duration,
    },

    /// Server sent something other than what the protocol allows here.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Stream broke or carried a malformed frame.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Frame payload was not a valid envelope.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Local I/O failed (reading input, socket shutdown).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}
