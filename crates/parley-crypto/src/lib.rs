//! Parley Room Cryptography
//!
//! Turns a `(room name, password)` pair into the two values a client needs:
//! an opaque room identifier the server routes on, and a symmetric key the
//! server never sees. Pure functions with deterministic outputs; the only
//! randomness is the per-message nonce, which callers may supply themselves.
//!
//! # Key Hierarchy
//!
//! ```text
//!  room name ──┐                         password
//!              │                             │
//!              ▼                             ▼
//!   Argon2id(salt = SHA-256(label‖password))   Argon2id(salt = fixed label)
//!              │                             │
//!              ▼                             ▼
//!    Room Identifier (base64url)         Room Key (32 bytes)
//!                                            │
//!                                            ▼
//!                              XChaCha20-Poly1305 → Token
//! ```
//!
//! # Security
//!
//! Implicit Membership:
//! - Two clients share a room iff they derive the same identifier, which
//!   requires the same room name and the same password
//! - A wrong password silently lands in a different room; there is no
//!   server-side check to brute-force against
//!
//! Stretching:
//! - Every guess costs one Argon2id evaluation with fixed parameters
//!
//! Authenticity:
//! - Tokens are AEAD ciphertexts; version and timestamp are bound as
//!   associated data, so any change to the token fails decryption

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod kdf;
pub mod token;

pub use error::{CryptoError, KdfError};
pub use kdf::{KdfParams, RoomCredentials, RoomKey, derive_room_identifier, derive_room_key};
pub use token::{NONCE_SIZE, OpenedMessage, TOKEN_VERSION};
