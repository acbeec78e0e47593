//! X25519 Diffie-Hellman key agreement.
//!
//! The authority holds one long-lived static key pair. Every sealed envelope
//! mints an ephemeral key pair whose secret half is consumed by the single
//! Diffie-Hellman it performs.
//!
//! ## Security Notes
//!
//! - Private keys are zeroized on drop and are not `Clone`
//! - Uses OsRng for key generation
//! - Shared secrets are zeroized after use

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Size of X25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of X25519 private key in bytes.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of shared secret in bytes.
pub const SHARED_SECRET_SIZE: usize = 32;

/// X25519 public key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
}

impl X25519PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PUBLIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| CryptoError::InvalidHexFormat(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Get the key as bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "X25519PublicKey({:02x}{:02x}..)",
            self.bytes[0], self.bytes[1]
        )
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(key: PublicKey) -> Self {
        Self {
            bytes: key.to_bytes(),
        }
    }
}

impl From<&X25519PublicKey> for PublicKey {
    fn from(key: &X25519PublicKey) -> Self {
        PublicKey::from(key.bytes)
    }
}

/// The authority's long-lived key pair.
///
/// Only the holder of this key pair can open envelopes sealed to its public
/// half.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AuthorityKeyPair {
    secret: [u8; PRIVATE_KEY_SIZE],
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl AuthorityKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self {
            secret: secret.to_bytes(),
            public,
        }
    }

    /// Restore a key pair from its secret bytes.
    ///
    /// # Security
    ///
    /// Only use bytes from a secure source.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PRIVATE_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PRIVATE_KEY_SIZE];
        arr.copy_from_slice(bytes);
        let secret = StaticSecret::from(arr);
        arr.zeroize();
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Ok(Self {
            secret: secret.to_bytes(),
            public,
        })
    }

    /// Restore a key pair from a hex-encoded secret.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self> {
        let mut bytes = hex::decode(hex_str.trim())
            .map_err(|e| CryptoError::InvalidHexFormat(e.to_string()))?;
        let pair = Self::from_secret_bytes(&bytes);
        bytes.zeroize();
        pair
    }

    /// Get the public key envelopes are sealed to.
    pub fn public_key(&self) -> &X25519PublicKey {
        &self.public
    }

    /// Get raw secret bytes (for export).
    ///
    /// # Security
    ///
    /// Handle with care - this exposes the private key.
    pub fn secret_bytes(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.secret
    }

    /// Perform Diffie-Hellman with a peer public key.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> SharedSecret {
        let secret = StaticSecret::from(self.secret);
        let shared = secret.diffie_hellman(&PublicKey::from(peer_public));
        SharedSecret {
            bytes: shared.to_bytes(),
        }
    }
}

impl std::fmt::Debug for AuthorityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityKeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// Clone is intentionally NOT implemented for AuthorityKeyPair.

/// Single-use key pair minted for one envelope.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &X25519PublicKey {
        &self.public
    }

    /// Perform Diffie-Hellman and consume the ephemeral key.
    ///
    /// The private key is destroyed after this operation.
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> SharedSecret {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer_public));
        SharedSecret {
            bytes: shared.to_bytes(),
        }
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EphemeralKeyPair {{ public: {:?} }}", self.public)
    }
}

/// Shared secret derived from Diffie-Hellman key exchange.
///
/// This should be used as input to a KDF, not directly as an encryption key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; SHARED_SECRET_SIZE],
}

impl SharedSecret {
    /// Derive an encryption key using BLAKE3 in key-derivation mode.
    pub fn derive_key(&self, context: &str) -> [u8; 32] {
        blake3::derive_key(context, &self.bytes)
    }

    /// True when the exchange produced the all-zero output of a low-order
    /// point. Constant time.
    pub fn is_degenerate(&self) -> bool {
        self.bytes.ct_eq(&[0u8; SHARED_SECRET_SIZE]).into()
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_and_authority_agree() {
        let authority = AuthorityKeyPair::generate();
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key().clone();

        let sender_side = ephemeral.diffie_hellman(authority.public_key());
        let authority_side = authority.diffie_hellman(&ephemeral_public);

        assert_eq!(
            sender_side.derive_key("test context"),
            authority_side.derive_key("test context")
        );
    }

    #[test]
    fn test_contexts_separate_keys() {
        let authority = AuthorityKeyPair::generate();
        let shared = EphemeralKeyPair::generate().diffie_hellman(authority.public_key());

        assert_ne!(shared.derive_key("context a"), shared.derive_key("context b"));
    }

    #[test]
    fn test_authority_secret_roundtrip() {
        let original = AuthorityKeyPair::generate();
        let restored = AuthorityKeyPair::from_secret_bytes(original.secret_bytes()).unwrap();
        assert_eq!(restored.public_key(), original.public_key());

        let from_hex = AuthorityKeyPair::from_secret_hex(&hex::encode(original.secret_bytes()))
            .unwrap();
        assert_eq!(from_hex.public_key(), original.public_key());
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let authority = AuthorityKeyPair::generate();
        let hex_str = authority.public_key().to_hex();
        assert_eq!(hex_str.len(), 64);
        assert_eq!(
            &X25519PublicKey::from_hex(&hex_str).unwrap(),
            authority.public_key()
        );
    }

    #[test]
    fn test_invalid_key_lengths() {
        assert!(X25519PublicKey::from_bytes(&[0u8; 16]).is_err());
        assert!(AuthorityKeyPair::from_secret_bytes(&[0u8; 31]).is_err());
        assert!(matches!(
            X25519PublicKey::from_hex("zz"),
            Err(CryptoError::InvalidHexFormat(_))
        ));
    }

    #[test]
    fn test_low_order_point_is_degenerate() {
        let authority = AuthorityKeyPair::generate();
        let zero_point = X25519PublicKey::from_bytes(&[0u8; PUBLIC_KEY_SIZE]).unwrap();
        assert!(authority.diffie_hellman(&zero_point).is_degenerate());

        let honest = EphemeralKeyPair::generate();
        assert!(!authority.diffie_hellman(honest.public_key()).is_degenerate());
    }

    #[test]
    fn test_debug_redacted() {
        let authority = AuthorityKeyPair::generate();
        let debug = format!("{:?}", authority);
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("X25519PublicKey"));
    }
}
