//! Password-based derivation of room identifiers and room keys.
//!
//! Both derivations run Argon2id over the user's input with fixed costs, so
//! every client that types the same `(room name, password)` arrives at the
//! same identifier and the same key without any exchange.
//!
//! # Domain Separation
//!
//! The identifier is salted with a hash of the password under an
//! identifier-specific label; the key is salted with a different fixed label.
//! The identifier is public (the server sees it) and must not let anyone
//! shortcut to the key, so the two derivations never share an Argon2 input.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KdfError;

/// Derived output size for both the identifier and the key.
const OUTPUT_LEN: usize = 32;

/// Label hashed with the password to form the identifier salt.
const ROOM_ID_LABEL: &[u8] = b"parley/room-id/v1";

/// Fixed salt for key derivation.
///
/// Changing this changes every room key; it is part of the protocol.
const ROOM_KEY_SALT: &[u8] = b"parley/room-key/v1";

/// Argon2id cost parameters.
///
/// All parties in a room must use identical parameters or they derive
/// different identifiers and never meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl KdfParams {
    /// Interactive-login costs: 19 MiB, 2 passes, 1 lane.
    pub const DEFAULT: Self = Self { memory_kib: 19 * 1024, iterations: 2, parallelism: 1 };

    /// Validate a custom cost triple.
    ///
    /// # Errors
    ///
    /// - `KdfError::InvalidParams` if Argon2 rejects the combination (for
    ///   example zero iterations, or less than 8 KiB of memory per lane)
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, KdfError> {
        Params::new(memory_kib, iterations, parallelism, Some(OUTPUT_LEN))
            .map_err(|e| KdfError::InvalidParams(e.to_string()))?;
        Ok(Self { memory_kib, iterations, parallelism })
    }

    /// Minimum Argon2 costs. Only for tests.
    pub const fn insecure_fast() -> Self {
        Self { memory_kib: 8, iterations: 1, parallelism: 1 }
    }

    /// Memory cost in KiB.
    pub const fn memory_kib(&self) -> u32 {
        self.memory_kib
    }

    /// Number of passes.
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Number of lanes.
    pub const fn parallelism(&self) -> u32 {
        self.parallelism
    }

    fn hash(&self, input: &[u8], salt: &[u8]) -> Zeroizing<[u8; OUTPUT_LEN]> {
        let Ok(params) =
            Params::new(self.memory_kib, self.iterations, self.parallelism, Some(OUTPUT_LEN))
        else {
            unreachable!("KdfParams are validated on construction");
        };
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut out = Zeroizing::new([0u8; OUTPUT_LEN]);
        let Ok(()) = argon2.hash_password_into(input, salt, &mut *out) else {
            unreachable!("salts are at least 16 bytes and the output length is fixed");
        };
        out
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Symmetric key for one room.
///
/// Zeroed on drop. `Debug` never prints key material.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RoomKey([u8; OUTPUT_LEN]);

impl RoomKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; OUTPUT_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; OUTPUT_LEN] {
        &self.0
    }
}

impl fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RoomKey([REDACTED])")
    }
}

/// Derive the public room identifier for `(room_name, password)`.
///
/// Deterministic. Returns 44 characters of URL-safe base64.
pub fn derive_room_identifier(room_name: &str, password: &str, params: &KdfParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ROOM_ID_LABEL);
    hasher.update(password.as_bytes());
    let salt = hasher.finalize();

    let digest = params.hash(room_name.as_bytes(), &salt);
    URL_SAFE.encode(&*digest)
}

/// Derive the room key for `password`.
///
/// Depends on the password alone. Rooms are told apart by identifier, not
/// by key.
pub fn derive_room_key(password: &str, params: &KdfParams) -> RoomKey {
    let digest = params.hash(password.as_bytes(), ROOM_KEY_SALT);
    RoomKey(*digest)
}

/// Everything a client derives before connecting.
#[derive(Debug, Clone)]
pub struct RoomCredentials {
    /// Identifier sent as `chat_id`
    pub room_id: String,
    /// Key for sealing and opening message tokens
    pub key: RoomKey,
}

impl RoomCredentials {
    /// Run both derivations.
    pub fn derive(room_name: &str, password: &str, params: &KdfParams) -> Self {
        Self {
            room_id: derive_room_identifier(room_name, password, params),
            key: derive_room_key(password, params),
        }
    }
}
