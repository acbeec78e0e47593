//! Fuzz target for identity reference parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tipline_reputation::IdentityRef;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(id) = IdentityRef::from_hex(s) {
            assert_eq!(id.to_hex(), s.to_lowercase());
            assert_eq!(IdentityRef::from_bytes(id.as_bytes()).unwrap(), id);
        }
    }
    // Deriving never fails for any handle.
    let _ = IdentityRef::derive(&String::from_utf8_lossy(data));
});
