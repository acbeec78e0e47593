//! XChaCha20-Poly1305 symmetric encryption.
//!
//! Provides AEAD encryption with 256-bit keys and 192-bit nonces.
//!
//! ## Security Notes
//!
//! - Keys are zeroized on drop
//! - Keys and nonces are generated with OsRng
//! - The caller owns the nonce so one nonce can seal both the payload and
//!   the wrapped key of an envelope (the two seals use independent keys)
//! - NEVER reuse a nonce with the same key

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Size of symmetric key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of nonce in bytes (192 bits for XChaCha20).
pub const NONCE_SIZE: usize = 24;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A 256-bit symmetric key for XChaCha20-Poly1305 encryption.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Generate a new random symmetric key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the key as a byte slice.
    ///
    /// # Security
    ///
    /// Be careful with this - avoid logging or persisting the returned bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// A 192-bit nonce for XChaCha20-Poly1305.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a nonce from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 24 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce as a byte slice.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({:02x}{:02x}..)", self.bytes[0], self.bytes[1])
    }
}

/// Seal `plaintext` under `(key, nonce)` with optional associated data.
///
/// The output is the ciphertext with the 16-byte tag appended.
pub fn seal(key: &SymmetricKey, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let xnonce = XNonce::from_slice(nonce.as_bytes());

    cipher
        .encrypt(
            xnonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption("XChaCha20-Poly1305 encryption failed".into()))
}

/// Open a ciphertext produced by [`seal`].
///
/// Returns `None` when the tag does not verify. Callers map that to the
/// error that names which layer of the envelope failed.
pub fn open(key: &SymmetricKey, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let xnonce = XNonce::from_slice(nonce.as_bytes());

    cipher
        .decrypt(
            xnonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = SymmetricKey::generate();
        let nonce = Nonce::generate();
        let plaintext = b"Meeting minutes attached";

        let sealed = seal(&key, &nonce, plaintext, b"").unwrap();
        let opened = open(&key, &nonce, &sealed, b"").unwrap();

        assert_eq!(plaintext.as_slice(), opened.as_slice());
        assert_eq!(sealed.len(), plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_open_fails_with_wrong_key() {
        let nonce = Nonce::generate();
        let sealed = seal(&SymmetricKey::generate(), &nonce, b"secret", b"").unwrap();

        assert!(open(&SymmetricKey::generate(), &nonce, &sealed, b"").is_none());
    }

    #[test]
    fn test_open_fails_with_wrong_nonce() {
        let key = SymmetricKey::generate();
        let sealed = seal(&key, &Nonce::generate(), b"secret", b"").unwrap();

        assert!(open(&key, &Nonce::generate(), &sealed, b"").is_none());
    }

    #[test]
    fn test_open_fails_with_tampered_ciphertext() {
        let key = SymmetricKey::generate();
        let nonce = Nonce::generate();
        let mut sealed = seal(&key, &nonce, b"secret", b"").unwrap();
        sealed[0] ^= 0xFF;

        assert!(open(&key, &nonce, &sealed, b"").is_none());
    }

    #[test]
    fn test_aad_mismatch_fails() {
        let key = SymmetricKey::generate();
        let nonce = Nonce::generate();
        let sealed = seal(&key, &nonce, b"secret", b"header-a").unwrap();

        assert!(open(&key, &nonce, &sealed, b"header-b").is_none());
    }

    #[test]
    fn test_empty_plaintext() {
        let key = SymmetricKey::generate();
        let nonce = Nonce::generate();
        let sealed = seal(&key, &nonce, b"", b"").unwrap();

        assert_eq!(sealed.len(), TAG_SIZE);
        assert_eq!(open(&key, &nonce, &sealed, b"").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_key_from_bytes_invalid_length() {
        let result = SymmetricKey::from_bytes(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_nonce_from_bytes_invalid_length() {
        let result = Nonce::from_bytes(&[0u8; 12]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: 12
            })
        ));
    }

    #[test]
    fn test_key_debug_redacted() {
        let key = SymmetricKey::from_bytes(&[0x42u8; KEY_SIZE]).unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }
}
