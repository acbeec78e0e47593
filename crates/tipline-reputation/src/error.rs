//! Error types for reputation operations.

use thiserror::Error;

/// Errors that can occur during reputation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReputationError {
    /// No record exists for the identity. Records are only created by
    /// registration, never as a side effect of an update.
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    /// Identity reference could not be parsed.
    #[error("Invalid identity reference: {0}")]
    InvalidIdentity(String),

    /// Ledger lock was poisoned by a panicking writer, or the backing
    /// store failed.
    #[error("Reputation ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result type for reputation operations.
pub type Result<T> = std::result::Result<T, ReputationError>;
