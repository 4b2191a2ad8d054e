//! Error types for room cryptography.

use thiserror::Error;

/// Errors from opening a ciphertext token.
///
/// Every variant means the message is dropped; none of them is fatal for a
/// session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Token is not URL-safe base64.
    #[error("token is not valid base64: {0}")]
    Encoding(String),

    /// Token is shorter than header, nonce and tag combined.
    #[error("token truncated: {len} bytes, need at least {min}")]
    Truncated {
        /// Decoded token length
        len: usize,
        /// Minimum valid length
        min: usize,
    },

    /// Token was produced by an unknown format version.
    #[error("unknown token version: {0:#04x}")]
    UnknownVersion(u8),

    /// Authentication tag did not verify: wrong key or tampered token.
    #[error("authentication failed")]
    Authentication,

    /// Decrypted bytes are not UTF-8 text.
    #[error("decrypted message is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors from configuring key derivation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KdfError {
    /// Argon2 rejected the cost parameters.
    #[error("invalid key derivation parameters: {0}")]
    InvalidParams(String),
}
