//! Sealed envelopes for report bodies and evidence files.
//!
//! An envelope is hybrid-encrypted so only the authority's secret key can
//! open it:
//!
//! 1. A random 32-byte payload key K and a random 24-byte nonce N are drawn
//! 2. The plaintext is sealed with XChaCha20-Poly1305 under (K, N)
//! 3. A fresh ephemeral X25519 key pair is generated
//! 4. K is sealed under a key derived from DH(ephemeral secret, authority
//!    public) with the same N and the ephemeral public key as associated data
//! 5. The ephemeral secret is dropped; only its public half travels
//!
//! Reusing N across steps 2 and 4 is sound because the two seals use
//! independent keys and carry independent tags.
//!
//! ## Example
//!
//! ```
//! use tipline_crypto::{open, seal, AuthorityKeyPair};
//!
//! let authority = AuthorityKeyPair::generate();
//! let envelope = seal(b"the ledger was altered", authority.public_key()).unwrap();
//! let plaintext = open(&envelope, &authority).unwrap();
//! assert_eq!(plaintext, b"the ledger was altered");
//! ```

use bincode::Options;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::hash::Hash256;
use crate::symmetric::{self, Nonce, SymmetricKey, KEY_SIZE};
use crate::x25519::{AuthorityKeyPair, EphemeralKeyPair, X25519PublicKey};
use crate::{CryptoError, Result};

/// Context string for deriving the key-wrap key from the DH output.
pub const KEY_WRAP_CONTEXT: &str = "TIPLINE envelope key-wrap v1";

/// Upper bound on an encoded envelope (64 MiB).
pub const MAX_ENVELOPE_BYTES: u64 = 64 * 1024 * 1024;

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_ENVELOPE_BYTES)
        .reject_trailing_bytes()
}

/// A hybrid-encrypted container.
///
/// Immutable once created: it is exchanged and stored but never edited in
/// place. Use [`SealedEnvelope::from_parts`] to rebuild one received as
/// separate fields.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    ciphertext: Vec<u8>,
    encrypted_key: Vec<u8>,
    ephemeral_public_key: X25519PublicKey,
    nonce: Nonce,
}

impl SealedEnvelope {
    /// Rebuild an envelope from its four wire fields.
    ///
    /// # Errors
    ///
    /// Returns a length error if the ephemeral key is not 32 bytes or the
    /// nonce is not 24 bytes.
    pub fn from_parts(
        ciphertext: Vec<u8>,
        encrypted_key: Vec<u8>,
        ephemeral_public_key: &[u8],
        nonce: &[u8],
    ) -> Result<Self> {
        Ok(Self {
            ciphertext,
            encrypted_key,
            ephemeral_public_key: X25519PublicKey::from_bytes(ephemeral_public_key)?,
            nonce: Nonce::from_bytes(nonce)?,
        })
    }

    /// The sealed payload with its tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The wrapped payload key with its tag.
    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }

    /// Public half of the single-use key pair.
    pub fn ephemeral_public_key(&self) -> &X25519PublicKey {
        &self.ephemeral_public_key
    }

    /// Nonce shared by both seals of this envelope.
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Encode to canonical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        codec()
            .serialize(self)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
    }

    /// Decode from canonical bytes. Trailing bytes are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        codec()
            .deserialize(bytes)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
    }

    /// BLAKE3 fingerprint of the canonical encoding.
    pub fn content_hash(&self) -> Result<Hash256> {
        Ok(Hash256::hash(&self.to_bytes()?))
    }
}

impl std::fmt::Debug for SealedEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedEnvelope")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("encrypted_key_len", &self.encrypted_key.len())
            .field("ephemeral_public_key", &self.ephemeral_public_key)
            .field("nonce", &self.nonce)
            .finish()
    }
}

fn wrap_key(shared: &crate::x25519::SharedSecret) -> Result<SymmetricKey> {
    let mut bytes = shared.derive_key(KEY_WRAP_CONTEXT);
    let key = SymmetricKey::from_bytes(&bytes);
    bytes.zeroize();
    key
}

/// Seal `plaintext` so that only the holder of `authority`'s secret key can
/// open it.
pub fn seal(plaintext: &[u8], authority: &X25519PublicKey) -> Result<SealedEnvelope> {
    let payload_key = SymmetricKey::generate();
    let nonce = Nonce::generate();

    let ciphertext = symmetric::seal(&payload_key, &nonce, plaintext, &[])?;

    let ephemeral = EphemeralKeyPair::generate();
    let ephemeral_public_key = ephemeral.public_key().clone();
    // Consumes the ephemeral secret.
    let shared = ephemeral.diffie_hellman(authority);
    let key_wrap = wrap_key(&shared)?;

    let encrypted_key = symmetric::seal(
        &key_wrap,
        &nonce,
        payload_key.as_bytes(),
        ephemeral_public_key.as_bytes(),
    )?;

    Ok(SealedEnvelope {
        ciphertext,
        encrypted_key,
        ephemeral_public_key,
        nonce,
    })
}

/// Open an envelope with the authority's key pair.
///
/// # Errors
///
/// - [`CryptoError::KeyRecoveryFailed`] if the wrapped key does not
///   authenticate (wrong authority, altered key, nonce or ephemeral key)
/// - [`CryptoError::PayloadAuthenticationFailed`] if the payload does not
///   authenticate under the recovered key
pub fn open(envelope: &SealedEnvelope, authority: &AuthorityKeyPair) -> Result<Vec<u8>> {
    let shared = authority.diffie_hellman(&envelope.ephemeral_public_key);
    if shared.is_degenerate() {
        return Err(CryptoError::KeyRecoveryFailed);
    }
    let key_wrap = wrap_key(&shared)?;

    let mut key_bytes = symmetric::open(
        &key_wrap,
        &envelope.nonce,
        &envelope.encrypted_key,
        envelope.ephemeral_public_key.as_bytes(),
    )
    .ok_or(CryptoError::KeyRecoveryFailed)?;

    if key_bytes.len() != KEY_SIZE {
        key_bytes.zeroize();
        return Err(CryptoError::KeyRecoveryFailed);
    }
    let payload_key = SymmetricKey::from_bytes(&key_bytes);
    key_bytes.zeroize();
    let payload_key = payload_key.map_err(|_| CryptoError::KeyRecoveryFailed)?;

    symmetric::open(&payload_key, &envelope.nonce, &envelope.ciphertext, &[])
        .ok_or(CryptoError::PayloadAuthenticationFailed)
}

/// Plaintext metadata that travels beside a sealed file.
///
/// None of these fields are confidential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Original file name.
    pub file_name: String,
    /// MIME type as reported by the uploader.
    pub mime_type: String,
    /// Plaintext size in bytes.
    pub size: u64,
}

/// An evidence file sealed with the same protocol as a report body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedFile {
    /// Unencrypted metadata.
    pub meta: FileMeta,
    /// The sealed file bytes.
    pub envelope: SealedEnvelope,
}

/// Seal raw file bytes.
pub fn seal_file(
    bytes: &[u8],
    file_name: impl Into<String>,
    mime_type: impl Into<String>,
    authority: &X25519PublicKey,
) -> Result<SealedFile> {
    Ok(SealedFile {
        meta: FileMeta {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
        },
        envelope: seal(bytes, authority)?,
    })
}

/// Open a sealed file.
///
/// The recovered length must match the advertised size.
pub fn open_file(file: &SealedFile, authority: &AuthorityKeyPair) -> Result<Vec<u8>> {
    let bytes = open(&file.envelope, authority)?;
    if bytes.len() as u64 != file.meta.size {
        return Err(CryptoError::MalformedEnvelope(format!(
            "file size mismatch: metadata says {}, payload has {}",
            file.meta.size,
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::{NONCE_SIZE, TAG_SIZE};

    #[test]
    fn test_seal_open_roundtrip() {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(b"payroll diverted to shell company", authority.public_key()).unwrap();

        assert_eq!(
            open(&envelope, &authority).unwrap(),
            b"payroll diverted to shell company"
        );
        assert_eq!(envelope.encrypted_key().len(), KEY_SIZE + TAG_SIZE);
        assert_eq!(envelope.nonce().as_bytes().len(), NONCE_SIZE);
    }

    #[test]
    fn test_wrong_authority_fails_key_recovery() {
        let authority = AuthorityKeyPair::generate();
        let stranger = AuthorityKeyPair::generate();
        let envelope = seal(b"report", authority.public_key()).unwrap();

        assert_eq!(
            open(&envelope, &stranger),
            Err(CryptoError::KeyRecoveryFailed)
        );
    }

    #[test]
    fn test_tampered_ciphertext_fails_payload_authentication() {
        let authority = AuthorityKeyPair::generate();
        let mut envelope = seal(b"report", authority.public_key()).unwrap();
        envelope.ciphertext[0] ^= 0x01;

        assert_eq!(
            open(&envelope, &authority),
            Err(CryptoError::PayloadAuthenticationFailed)
        );
    }

    #[test]
    fn test_tampered_key_fails_key_recovery() {
        let authority = AuthorityKeyPair::generate();
        let mut envelope = seal(b"report", authority.public_key()).unwrap();
        let last = envelope.encrypted_key.len() - 1;
        envelope.encrypted_key[last] ^= 0x80;

        assert_eq!(
            open(&envelope, &authority),
            Err(CryptoError::KeyRecoveryFailed)
        );
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(b"report", authority.public_key()).unwrap();

        let mut nonce = *envelope.nonce().as_bytes();
        nonce[5] ^= 0x10;
        let tampered = SealedEnvelope::from_parts(
            envelope.ciphertext().to_vec(),
            envelope.encrypted_key().to_vec(),
            envelope.ephemeral_public_key().as_bytes(),
            &nonce,
        )
        .unwrap();

        assert!(open(&tampered, &authority).is_err());
    }

    #[test]
    fn test_swapped_ephemeral_key_fails() {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(b"report", authority.public_key()).unwrap();
        let other = EphemeralKeyPair::generate();

        let tampered = SealedEnvelope::from_parts(
            envelope.ciphertext().to_vec(),
            envelope.encrypted_key().to_vec(),
            other.public_key().as_bytes(),
            envelope.nonce().as_bytes(),
        )
        .unwrap();

        assert_eq!(
            open(&tampered, &authority),
            Err(CryptoError::KeyRecoveryFailed)
        );
    }

    #[test]
    fn test_low_order_ephemeral_key_rejected() {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(b"report", authority.public_key()).unwrap();
        let tampered = SealedEnvelope::from_parts(
            envelope.ciphertext().to_vec(),
            envelope.encrypted_key().to_vec(),
            &[0u8; 32],
            envelope.nonce().as_bytes(),
        )
        .unwrap();

        assert_eq!(
            open(&tampered, &authority),
            Err(CryptoError::KeyRecoveryFailed)
        );
    }

    #[test]
    fn test_same_plaintext_gets_fresh_nonce_and_ciphertext() {
        let authority = AuthorityKeyPair::generate();
        let a = seal(b"same report", authority.public_key()).unwrap();
        let b = seal(b"same report", authority.public_key()).unwrap();

        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.ciphertext(), b.ciphertext());
        assert_ne!(a.ephemeral_public_key(), b.ephemeral_public_key());
    }

    #[test]
    fn test_bytes_roundtrip_and_trailing_bytes_rejected() {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(b"report", authority.public_key()).unwrap();

        let bytes = envelope.to_bytes().unwrap();
        let decoded = SealedEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(open(&decoded, &authority).unwrap(), b"report");

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(
            SealedEnvelope::from_bytes(&padded),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(SealedEnvelope::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_content_hash_tracks_bytes() {
        let authority = AuthorityKeyPair::generate();
        let a = seal(b"report", authority.public_key()).unwrap();
        let b = seal(b"report", authority.public_key()).unwrap();

        assert_eq!(a.content_hash().unwrap(), a.clone().content_hash().unwrap());
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn test_file_roundtrip_keeps_metadata_in_clear() {
        let authority = AuthorityKeyPair::generate();
        let scan = vec![0x89u8, b'P', b'N', b'G', 0, 1, 2, 3];
        let file = seal_file(&scan, "invoice.png", "image/png", authority.public_key()).unwrap();

        assert_eq!(file.meta.file_name, "invoice.png");
        assert_eq!(file.meta.mime_type, "image/png");
        assert_eq!(file.meta.size, scan.len() as u64);
        assert_eq!(open_file(&file, &authority).unwrap(), scan);
    }

    #[test]
    fn test_file_size_mismatch_detected() {
        let authority = AuthorityKeyPair::generate();
        let mut file = seal_file(b"abc", "a.txt", "text/plain", authority.public_key()).unwrap();
        file.meta.size = 4;

        assert!(matches!(
            open_file(&file, &authority),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
