//! Error types for sealing and opening envelopes.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
///
/// The two open failures are terminal for an envelope: there is no lenient
/// decryption and no retry with alternate keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The wrapped symmetric key did not authenticate under the authority key.
    #[error("Key recovery failed: wrong authority key or corrupted envelope")]
    KeyRecoveryFailed,

    /// The payload did not authenticate under the recovered symmetric key.
    #[error("Payload authentication failed: ciphertext was altered")]
    PayloadAuthenticationFailed,

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Invalid key length.
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length.
        expected: usize,
        /// Actual key length.
        actual: usize,
    },

    /// Invalid nonce length.
    #[error("Invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected nonce length.
        expected: usize,
        /// Actual nonce length.
        actual: usize,
    },

    /// Invalid hash length.
    #[error("Invalid hash length: expected {expected}, got {actual}")]
    InvalidHashLength {
        /// Expected hash length.
        expected: usize,
        /// Actual hash length.
        actual: usize,
    },

    /// Invalid hex string format.
    #[error("Invalid hex string: {0}")]
    InvalidHexFormat(String),

    /// Envelope bytes could not be decoded.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
