//! Parley chat client.
//!
//! Joins a room on a Parley relay and exchanges end-to-end encrypted lines
//! with the other members.
//!
//! # Flow
//!
//! 1. The caller supplies a [`Login`] (username, room name, password).
//! 2. [`ClientSession::connect`] derives the room identifier and key, dials
//!    the server, sends `CONNECT` and waits for `JOINED`.
//! 3. [`ConnectedSession::run`] sends each input line as an encrypted
//!    `MESSAGE` and reports relayed traffic as [`ClientEvent`]s, reading and
//!    writing on separate socket halves.
//!
//! The room name and password never leave the process. A wrong password
//! derives a different room identifier, so it ends up alone in an empty
//! room rather than being rejected.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
mod session;

pub use error::ClientError;
pub use event::ClientEvent;
pub use session::{
    ClientConfig, ClientSession, ConnectedSession, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_DISCONNECT_COMMAND, Login, SessionEnd,
};
