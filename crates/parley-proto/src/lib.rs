//! Parley wire protocol.
//!
//! Two layers, both shared by the server and the client:
//!
//! - [`frame`]: length-prefixed frames over any byte stream. A fixed-width
//!   ASCII decimal header carries the payload length. The codec never looks
//!   inside the payload.
//! - [`envelope`]: the typed message carried in a frame payload,
//!   serialized as a string-keyed JSON object tagged by `type`.
//!
//! The server routes on [`Envelope::chat_id`] and never inspects chat
//! contents, which are ciphertext tokens produced by `parley-crypto`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod envelope;
pub mod errors;
pub mod frame;

pub use envelope::{ChatMessage, Envelope, JoinAck, JoinStatus, Presence, RoomId};
pub use errors::{DecodeError, FramingError};
pub use frame::{DEFAULT_HEADER_WIDTH, DEFAULT_MAX_PAYLOAD, FrameCodec};
