//! Ciphertext tokens carried in `MESSAGE.contents`.
//!
//! # Format
//!
//! ```text
//! base64url( version:u8 | issued_at:u64 BE | nonce:[u8; 24] | ciphertext‖tag )
//! ```
//!
//! - version: currently [`TOKEN_VERSION`]
//! - issued_at: seconds since the Unix epoch at encryption time
//! - nonce: random per message (XChaCha20's 192-bit nonce makes collisions
//!   negligible without coordination)
//! - ciphertext‖tag: XChaCha20-Poly1305 output, 16-byte tag included
//!
//! Version and timestamp are authenticated as associated data.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::URL_SAFE};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};

use crate::{error::CryptoError, kdf::RoomKey};

/// Current token format.
pub const TOKEN_VERSION: u8 = 0x01;

/// XChaCha20-Poly1305 nonce size.
pub const NONCE_SIZE: usize = 24;

const HEADER_SIZE: usize = 1 + 8;
const TAG_SIZE: usize = 16;
const MIN_TOKEN_SIZE: usize = HEADER_SIZE + NONCE_SIZE + TAG_SIZE;

/// A successfully authenticated and decrypted token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedMessage {
    /// Message text
    pub plaintext: String,
    /// Sender's clock at encryption time, seconds since the Unix epoch
    pub issued_at: u64,
}

impl RoomKey {
    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(self.as_bytes().into())
    }

    /// Encrypt `plaintext` with an explicit nonce and timestamp.
    ///
    /// Deterministic, for tests and simulation. Reusing a nonce under the
    /// same key breaks confidentiality; production code calls
    /// [`Self::encrypt`].
    pub fn seal(&self, plaintext: &str, nonce: [u8; NONCE_SIZE], issued_at: u64) -> String {
        let mut header = [0u8; HEADER_SIZE];
        header[0] = TOKEN_VERSION;
        header[1..].copy_from_slice(&issued_at.to_be_bytes());

        let payload = Payload { msg: plaintext.as_bytes(), aad: &header };
        let Ok(ciphertext) = self.cipher().encrypt(XNonce::from_slice(&nonce), payload) else {
            unreachable!("XChaCha20-Poly1305 encryption only fails on oversized input");
        };

        let mut token = Vec::with_capacity(HEADER_SIZE + NONCE_SIZE + ciphertext.len());
        token.extend_from_slice(&header);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        URL_SAFE.encode(token)
    }

    /// Encrypt `plaintext` with a fresh random nonce and the current time.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let issued_at = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());

        self.seal(plaintext, nonce, issued_at)
    }

    /// Authenticate and decrypt a token.
    ///
    /// # Errors
    ///
    /// - `CryptoError::Encoding` if the token is not URL-safe base64
    /// - `CryptoError::Truncated` if it is too short to hold a header,
    ///   nonce and tag
    /// - `CryptoError::UnknownVersion` if the version byte is unsupported
    /// - `CryptoError::Authentication` on a wrong key or any modification
    /// - `CryptoError::InvalidUtf8` if the plaintext is not text
    pub fn decrypt(&self, token: &str) -> Result<OpenedMessage, CryptoError> {
        let bytes = URL_SAFE
            .decode(token.trim())
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;

        if bytes.len() < MIN_TOKEN_SIZE {
            return Err(CryptoError::Truncated { len: bytes.len(), min: MIN_TOKEN_SIZE });
        }

        let (header, rest) = bytes.split_at(HEADER_SIZE);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        if header[0] != TOKEN_VERSION {
            return Err(CryptoError::UnknownVersion(header[0]));
        }
        let mut issued_at = [0u8; 8];
        issued_at.copy_from_slice(&header[1..]);

        let plaintext = self
            .cipher()
            .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: header })
            .map_err(|_| CryptoError::Authentication)?;

        let plaintext = String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)?;
        Ok(OpenedMessage { plaintext, issued_at: u64::from_be_bytes(issued_at) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{KdfParams, derive_room_key};

    fn key(password: &str) -> RoomKey {
        derive_room_key(password, &KdfParams::insecure_fast())
    }

    fn raw(token: &str) -> Vec<u8> {
        URL_SAFE.decode(token).unwrap()
    }

    #[test]
    fn seal_then_decrypt() {
        let key = key("secret");
        let token = key.seal("hi", [7; NONCE_SIZE], 1_700_000_000);

        let opened = key.decrypt(&token).unwrap();
        assert_eq!(opened.plaintext, "hi");
        assert_eq!(opened.issued_at, 1_700_000_000);
    }

    #[test]
    fn seal_is_deterministic_for_fixed_inputs() {
        let key = key("secret");

        assert_eq!(key.seal("hi", [1; NONCE_SIZE], 5), key.seal("hi", [1; NONCE_SIZE], 5));
        assert_ne!(key.seal("hi", [1; NONCE_SIZE], 5), key.seal("hi", [2; NONCE_SIZE], 5));
    }

    #[test]
    fn encrypt_uses_fresh_nonces() {
        let key = key("secret");
        let a = key.encrypt("hi");
        let b = key.encrypt("hi");

        assert_ne!(a, b);
        assert_eq!(key.decrypt(&a).unwrap().plaintext, "hi");
        assert_eq!(key.decrypt(&b).unwrap().plaintext, "hi");
    }

    #[test]
    fn token_layout() {
        let token = key("secret").seal("hello", [9; NONCE_SIZE], 0x0102_0304);
        let bytes = raw(&token);

        assert_eq!(bytes[0], TOKEN_VERSION);
        assert_eq!(&bytes[1..9], &0x0102_0304u64.to_be_bytes());
        assert_eq!(&bytes[9..33], &[9; NONCE_SIZE]);
        assert_eq!(bytes.len(), MIN_TOKEN_SIZE + "hello".len());
        assert!(!token.contains('+') && !token.contains('/'));
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let key = key("secret");
        let token = key.seal("", [0; NONCE_SIZE], 0);

        assert_eq!(key.decrypt(&token).unwrap().plaintext, "");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let token = key("secret").encrypt("hi");

        assert_eq!(key("other").decrypt(&token), Err(CryptoError::Authentication));
    }

    #[test]
    fn tampered_timestamp_fails_authentication() {
        let key = key("secret");
        let mut bytes = raw(&key.seal("hi", [3; NONCE_SIZE], 10));
        bytes[8] ^= 0x01;

        assert_eq!(key.decrypt(&URL_SAFE.encode(bytes)), Err(CryptoError::Authentication));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let key = key("secret");
        let mut bytes = raw(&key.seal("hi", [3; NONCE_SIZE], 10));
        bytes[0] = 0x80;

        assert_eq!(key.decrypt(&URL_SAFE.encode(bytes)), Err(CryptoError::UnknownVersion(0x80)));
    }

    #[test]
    fn short_token_is_truncated() {
        let token = URL_SAFE.encode([TOKEN_VERSION; 20]);

        assert_eq!(
            key("secret").decrypt(&token),
            Err(CryptoError::Truncated { len: 20, min: MIN_TOKEN_SIZE })
        );
    }

    #[test]
    fn non_base64_is_an_encoding_error() {
        assert!(matches!(key("secret").decrypt("not base64!!"), Err(CryptoError::Encoding(_))));
        // Standard-alphabet characters are not URL-safe
        assert!(matches!(key("secret").decrypt("ab+/"), Err(CryptoError::Encoding(_))));
    }
}
