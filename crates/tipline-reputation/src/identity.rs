//! Opaque identity references.
//!
//! An `IdentityRef` is a BLAKE3 digest of an external handle (a messaging
//! account, a wallet address) with a domain prefix, so the core never stores
//! the handle itself.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tipline_crypto::Hash256;

use crate::{ReputationError, Result};

/// Domain separator for identity derivation.
const IDENTITY_DOMAIN: &[u8] = b"TIPLINE-IDENTITY-v1";

/// Reference to an owning identity.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityRef(Hash256);

impl IdentityRef {
    /// Size in bytes.
    pub const SIZE: usize = 32;

    /// Derive the reference for an external handle.
    pub fn derive(handle: &str) -> Self {
        Self(Hash256::hash_many(&[IDENTITY_DOMAIN, handle.as_bytes()]))
    }

    /// Rebuild from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Hash256::from_bytes(bytes)
            .map(Self)
            .map_err(|e| ReputationError::InvalidIdentity(e.to_string()))
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        Hash256::from_hex(s)
            .map(Self)
            .map_err(|e| ReputationError::InvalidIdentity(e.to_string()))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// First 16 hex characters, for logs.
    pub fn short(&self) -> String {
        let hex = self.to_hex();
        format!("{}...", &hex[..16])
    }
}

impl ConstantTimeEq for IdentityRef {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0.ct_eq(&other.0)
    }
}

impl PartialEq for IdentityRef {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for IdentityRef {}

impl std::hash::Hash for IdentityRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for IdentityRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IdentityRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl std::fmt::Debug for IdentityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityRef({})", self.short())
    }
}

impl std::fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for IdentityRef {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}
