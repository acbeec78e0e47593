//! Property-based tests for the envelope codec.
//!
//! - Round trip for arbitrary plaintexts
//! - Any single flipped byte in the ciphertext, wrapped key or nonce is
//!   rejected, never opened to altered plaintext
//! - Every envelope draws a fresh nonce

use proptest::prelude::*;

use crate::{open, seal, AuthorityKeyPair, CryptoError, SealedEnvelope};

fn rebuild(
    envelope: &SealedEnvelope,
    ciphertext: Vec<u8>,
    encrypted_key: Vec<u8>,
    nonce: Vec<u8>,
) -> SealedEnvelope {
    SealedEnvelope::from_parts(
        ciphertext,
        encrypted_key,
        envelope.ephemeral_public_key().as_bytes(),
        &nonce,
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Opening a sealed envelope returns the original plaintext.
    #[test]
    fn seal_open_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..2048)) {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(&plaintext, authority.public_key()).unwrap();
        prop_assert_eq!(open(&envelope, &authority).unwrap(), plaintext);
    }

    /// Flipping any ciphertext byte fails payload authentication.
    #[test]
    fn flipped_ciphertext_byte_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(&plaintext, authority.public_key()).unwrap();

        let mut ciphertext = envelope.ciphertext().to_vec();
        let i = index.index(ciphertext.len());
        ciphertext[i] ^= mask;
        let tampered = rebuild(
            &envelope,
            ciphertext,
            envelope.encrypted_key().to_vec(),
            envelope.nonce().as_bytes().to_vec(),
        );

        prop_assert_eq!(open(&tampered, &authority), Err(CryptoError::PayloadAuthenticationFailed));
    }

    /// Flipping any wrapped-key byte fails key recovery.
    #[test]
    fn flipped_key_byte_rejected(index in any::<prop::sample::Index>(), mask in 1u8..=255) {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(b"evidence", authority.public_key()).unwrap();

        let mut encrypted_key = envelope.encrypted_key().to_vec();
        let i = index.index(encrypted_key.len());
        encrypted_key[i] ^= mask;
        let tampered = rebuild(
            &envelope,
            envelope.ciphertext().to_vec(),
            encrypted_key,
            envelope.nonce().as_bytes().to_vec(),
        );

        prop_assert_eq!(open(&tampered, &authority), Err(CryptoError::KeyRecoveryFailed));
    }

    /// Flipping any nonce byte fails key recovery.
    #[test]
    fn flipped_nonce_byte_rejected(index in any::<prop::sample::Index>(), mask in 1u8..=255) {
        let authority = AuthorityKeyPair::generate();
        let envelope = seal(b"evidence", authority.public_key()).unwrap();

        let mut nonce = envelope.nonce().as_bytes().to_vec();
        let i = index.index(nonce.len());
        nonce[i] ^= mask;
        let tampered = rebuild(
            &envelope,
            envelope.ciphertext().to_vec(),
            envelope.encrypted_key().to_vec(),
            nonce,
        );

        prop_assert_eq!(open(&tampered, &authority), Err(CryptoError::KeyRecoveryFailed));
    }

    /// Sealing the same plaintext twice never repeats a nonce or ciphertext.
    #[test]
    fn nonce_is_fresh_per_envelope(plaintext in prop::collection::vec(any::<u8>(), 1..128)) {
        let authority = AuthorityKeyPair::generate();
        let a = seal(&plaintext, authority.public_key()).unwrap();
        let b = seal(&plaintext, authority.public_key()).unwrap();

        prop_assert_ne!(a.nonce(), b.nonce());
        prop_assert_ne!(a.ciphertext(), b.ciphertext());
    }

    /// Arbitrary bytes never decode into a panic.
    #[test]
    fn from_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = SealedEnvelope::from_bytes(&bytes);
    }
}
