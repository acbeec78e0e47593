//! Reporting sessions and their state machine.
//!
//! ```text
//! pending ──submit──▶ under_review ──adjudicate──▶ verified | rejected
//!    │
//!    └──expire──▶ closed
//! ```
//!
//! Every transition is one-way. Transition methods never mutate in place;
//! they return the next version of the session, which the store swaps in
//! only if the stored version is still the one the transition started from.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tipline_crypto::Hash256;
use tipline_jury::ReportId;
use tipline_reputation::IdentityRef;

use crate::error::{Action, LifecycleError};
use crate::report::Outcome;

/// Symbols used in session codes. No `0/O` or `1/I` to misread.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Domain separator for session fingerprints sent to the ledger.
const SESSION_DOMAIN: &[u8] = b"TIPLINE-SESSION-v1";

/// Short opaque session code.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Random code of `length` symbols from [`CODE_ALPHABET`].
    pub fn generate(length: usize) -> Self {
        let mut rng = OsRng;
        let code = (0..length)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Parse a code typed by a reporter. Case-insensitive.
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() || !code.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            return None;
        }
        Some(Self(code))
    }

    /// The code.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Report id bound to this session.
    pub fn report_id(&self) -> ReportId {
        ReportId::for_session(&self.0)
    }

    /// Fingerprint recorded on the ledger instead of the code.
    pub fn fingerprint(&self) -> Hash256 {
        Hash256::hash_many(&[SESSION_DOMAIN, self.0.as_bytes()])
    }
}

impl std::fmt::Debug for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Waiting for a submission.
    Pending,
    /// Submitted and awaiting a verdict.
    UnderReview,
    /// Verdict: genuine.
    Verified,
    /// Verdict: not genuine.
    Rejected,
    /// Expired without a submission.
    Closed,
}

impl SessionStatus {
    /// True for verified, rejected and closed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Rejected | Self::Closed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Ledger references returned when a submission is recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Ledger transaction.
    pub tx_ref: String,
    /// Ledger-side report handle, used for settlement.
    pub report_ref: String,
}

/// An anonymous reporting slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session code.
    pub id: SessionId,
    /// Owning identity.
    pub owner: IdentityRef,
    /// Current status.
    pub status: SessionStatus,
    /// Content address of the sealed report body.
    pub content_address: Option<String>,
    /// Submission receipt from the ledger.
    pub receipt: Option<SubmissionReceipt>,
    /// Settlement transaction.
    pub settlement_tx: Option<String>,
    /// Reward bound at verification.
    pub reward: Option<u64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Submissions are refused from this instant on.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// New pending session.
    pub fn new(id: SessionId, owner: IdentityRef, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id,
            owner,
            status: SessionStatus::Pending,
            content_address: None,
            receipt: None,
            settlement_tx: None,
            reward: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Report id bound to this session.
    pub fn report_id(&self) -> ReportId {
        self.id.report_id()
    }

    /// True if pending and past expiry. Only pending sessions expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Pending && now >= self.expires_at
    }

    /// True if the sweep may delete this session.
    pub fn is_sweepable(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Closed || self.is_expired(now)
    }

    fn invalid(&self, action: Action) -> LifecycleError {
        LifecycleError::InvalidTransition {
            session: self.id.clone(),
            from: self.status,
            action,
        }
    }

    /// Check that a submission would be accepted now.
    pub fn check_submittable(&self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        match self.status {
            SessionStatus::Pending if self.is_expired(now) => {
                Err(LifecycleError::SessionExpired(self.id.clone()))
            }
            SessionStatus::Pending => Ok(()),
            SessionStatus::Closed => Err(LifecycleError::SessionExpired(self.id.clone())),
            _ => Err(self.invalid(Action::Submit)),
        }
    }

    /// `pending → under_review`.
    pub fn submitted(
        &self,
        now: DateTime<Utc>,
        content_address: String,
        receipt: SubmissionReceipt,
    ) -> Result<Self, LifecycleError> {
        self.check_submittable(now)?;
        let mut next = self.clone();
        next.status = SessionStatus::UnderReview;
        next.content_address = Some(content_address);
        next.receipt = Some(receipt);
        Ok(next)
    }

    /// Check that a verdict would be accepted.
    pub fn check_adjudicable(
        &self,
        outcome: Outcome,
        reward: Option<u64>,
    ) -> Result<(), LifecycleError> {
        if self.status != SessionStatus::UnderReview {
            return Err(self.invalid(Action::Adjudicate));
        }
        if outcome == Outcome::Rejected && reward.is_some() {
            return Err(LifecycleError::RewardNotAllowed(self.id.clone()));
        }
        Ok(())
    }

    /// `under_review → verified | rejected`.
    pub fn adjudicated(
        &self,
        outcome: Outcome,
        reward: Option<u64>,
        settlement_tx: String,
    ) -> Result<Self, LifecycleError> {
        self.check_adjudicable(outcome, reward)?;
        let mut next = self.clone();
        next.status = outcome.session_status();
        next.reward = reward;
        next.settlement_tx = Some(settlement_tx);
        Ok(next)
    }

    /// `pending → closed`, only once expired.
    pub fn closed(&self, now: DateTime<Utc>) -> Result<Self, LifecycleError> {
        if !self.is_expired(now) {
            return Err(self.invalid(Action::Expire));
        }
        let mut next = self.clone();
        next.status = SessionStatus::Closed;
        Ok(next)
    }
}
