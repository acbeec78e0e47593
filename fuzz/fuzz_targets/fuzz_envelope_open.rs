//! Fuzz target for opening tampered envelopes.
//!
//! Flips bytes of a valid envelope. Opening must either return the original
//! plaintext or one of the two authentication errors.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tipline_crypto::{open, seal, AuthorityKeyPair, CryptoError, SealedEnvelope};

fuzz_target!(|data: &[u8]| {
    let authority = AuthorityKeyPair::generate();
    let envelope = seal(b"fuzzed report body", authority.public_key()).unwrap();
    let mut bytes = envelope.to_bytes().unwrap();

    for chunk in data.chunks(3) {
        if let [pos_hi, pos_lo, mask] = *chunk {
            let pos = usize::from(u16::from_be_bytes([pos_hi, pos_lo])) % bytes.len();
            bytes[pos] ^= mask;
        }
    }

    let Ok(tampered) = SealedEnvelope::from_bytes(&bytes) else {
        return;
    };
    match open(&tampered, &authority) {
        Ok(plaintext) => assert_eq!(plaintext, b"fuzzed report body"),
        Err(CryptoError::KeyRecoveryFailed) | Err(CryptoError::PayloadAuthenticationFailed) => {}
        Err(e) => panic!("unexpected error: {e}"),
    }
});
