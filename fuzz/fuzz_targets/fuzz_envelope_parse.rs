//! Fuzz target for envelope decoding.
//!
//! Arbitrary bytes must decode to an envelope or fail cleanly, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tipline_crypto::SealedEnvelope;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = SealedEnvelope::from_bytes(data) {
        // Anything that decodes must re-encode to the same bytes.
        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(bytes.as_slice(), data);
        assert_eq!(envelope.nonce().as_bytes().len(), 24);
    }
});
