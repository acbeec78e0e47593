//! Error types for the report desk.

use thiserror::Error;
use tipline_jury::ReportId;

use crate::external::ExternalError;
use crate::session::{SessionId, SessionStatus};
use crate::store::StoreError;

/// Action attempted on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Attach a submission.
    Submit,
    /// Settle a verdict.
    Adjudicate,
    /// Close after expiry.
    Expire,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit => write!(f, "submit"),
            Self::Adjudicate => write!(f, "adjudicate"),
            Self::Expire => write!(f, "expire"),
        }
    }
}

/// Session lifecycle violations. Terminal for the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// No session with this id.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The session passed its expiry while pending.
    #[error("Session expired: {0}")]
    SessionExpired(SessionId),

    /// The action is not allowed from the session's status.
    #[error("Invalid transition for session {session}: cannot {action} from {from}")]
    InvalidTransition {
        /// Session the action targeted.
        session: SessionId,
        /// Status the session was in.
        from: SessionStatus,
        /// Attempted action.
        action: Action,
    },

    /// A reward was offered with a rejection.
    #[error("Reward not allowed when rejecting session {0}")]
    RewardNotAllowed(SessionId),
}

/// Errors that can occur during desk operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Lifecycle violation.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Voting violation.
    #[error("Voting error: {0}")]
    Voting(#[from] tipline_jury::VotingError),

    /// Cryptographic error.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] tipline_crypto::CryptoError),

    /// Reputation error.
    #[error("Reputation error: {0}")]
    Reputation(#[from] tipline_reputation::ReputationError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// External collaborator failed. Retryable by the caller.
    #[error("External dependency error: {0}")]
    External(#[from] ExternalError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// No report with this id.
    #[error("Report not found: {0}")]
    ReportNotFound(ReportId),

    /// No evidence file at this index.
    #[error("Evidence {index} not found on report {report}")]
    EvidenceNotFound {
        /// Report searched.
        report: ReportId,
        /// Requested index.
        index: usize,
    },

    /// A second decryption produced different plaintext.
    #[error("Decrypted content diverged for report {0}")]
    ContentDiverged(ReportId),

    /// Every generated session code was already taken.
    #[error("Could not allocate a session code after {0} attempts")]
    SessionIdExhausted(u32),
}

/// Result type for desk operations.
pub type Result<T> = std::result::Result<T, CoreError>;
