//! # tipline-crypto
//!
//! Sealed envelopes for anonymous reports.
//!
//! This crate provides:
//! - **XChaCha20-Poly1305** for payload encryption
//! - **X25519** ephemeral key agreement for wrapping the payload key
//! - **BLAKE3** for hashing and key derivation
//!
//! ## Security
//!
//! All secret data uses `zeroize` for secure memory cleanup.
//! All comparisons of secrets use constant-time operations via `subtle`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod hash;
pub mod symmetric;
pub mod x25519;

#[cfg(test)]
mod proptests;

pub use envelope::{open, open_file, seal, seal_file, FileMeta, SealedEnvelope, SealedFile};
pub use error::{CryptoError, Result};
pub use hash::Hash256;
pub use symmetric::{Nonce, SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use x25519::{AuthorityKeyPair, EphemeralKeyPair, X25519PublicKey};
