//! Protocol error types.
//!
//! Framing errors and envelope decode errors are kept apart so callers can
//! tell a broken stream from a well-framed but meaningless payload. Both are
//! fatal for the connection that produced them.

use std::io;

use thiserror::Error;

/// Errors from reading or writing length-prefixed frames.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Header width of zero cannot carry a length.
    #[error("header width must be at least 1 byte, got {0}")]
    InvalidHeaderWidth(usize),

    /// Decimal length needs more digits than the header has room for.
    #[error("payload length {len} does not fit in a {width}-byte header")]
    LengthOverflow {
        /// Payload length that was advertised
        len: usize,
        /// Configured header width
        width: usize,
    },

    /// Payload exceeds the codec's configured maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Advertised or actual payload size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Header bytes are not an unsigned decimal integer.
    #[error("invalid frame header: {header:?}")]
    InvalidHeader {
        /// Header contents, lossily decoded for diagnostics
        header: String,
    },

    /// Stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    Closed,

    /// Stream ended part way through the length header.
    #[error("truncated frame header: expected {expected} bytes, got {actual}")]
    TruncatedHeader {
        /// Header width
        expected: usize,
        /// Bytes read before end of stream
        actual: usize,
    },

    /// Stream ended before the advertised payload length was read.
    #[error("truncated frame payload: expected {expected} bytes, got {actual}")]
    TruncatedPayload {
        /// Advertised payload length
        expected: usize,
        /// Bytes read before end of stream
        actual: usize,
    },

    /// Underlying stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// True when the peer closed the stream between frames.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Errors from decoding an envelope out of a frame payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not a JSON object of the expected shape.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Object has no string `type` field.
    #[error("envelope has no type tag")]
    MissingType,

    /// `type` names a message kind this protocol does not define.
    #[error("unknown envelope type: {0:?}")]
    UnknownType(String),
}
