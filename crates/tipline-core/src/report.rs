//! Submitted reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tipline_crypto::{FileMeta, Hash256};
use tipline_jury::{ReportId, Vote};
use tipline_reputation::IdentityRef;

use crate::annotation::Annotation;
use crate::error::{CoreError, Result};
use crate::session::{SessionId, SessionStatus};

/// Final decision on a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The report is genuine.
    Verified,
    /// The report is not genuine.
    Rejected,
}

impl Outcome {
    /// Session status this outcome moves to.
    pub fn session_status(self) -> SessionStatus {
        match self {
            Self::Verified => SessionStatus::Verified,
            Self::Rejected => SessionStatus::Rejected,
        }
    }

    /// Report status this outcome moves to.
    pub fn report_status(self) -> ReportStatus {
        match self {
            Self::Verified => ReportStatus::Verified,
            Self::Rejected => ReportStatus::Rejected,
        }
    }

    /// The ballot that agrees with this outcome.
    pub fn as_vote(self) -> Vote {
        match self {
            Self::Verified => Vote::Valid,
            Self::Rejected => Vote::Invalid,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verified => write!(f, "verified"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Report status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    /// Awaiting a verdict. Votes are accepted.
    UnderReview,
    /// Verified.
    Verified,
    /// Rejected.
    Rejected,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnderReview => write!(f, "under_review"),
            Self::Verified => write!(f, "verified"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A pinned evidence file.
///
/// The metadata is plaintext and travels next to the sealed bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Content address of the sealed file envelope.
    pub address: String,
    /// Plaintext file metadata.
    pub meta: FileMeta,
}

/// A submitted report. Created once at submission and never deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report id, derived from the session code.
    pub id: ReportId,
    /// Bound session.
    pub session_id: SessionId,
    /// Reporter identity.
    pub owner: IdentityRef,
    /// Content address of the sealed body.
    pub content_address: String,
    /// BLAKE3 of the content address, as recorded on the ledger.
    pub address_hash: Hash256,
    /// Pinned evidence.
    pub evidence: Vec<EvidenceRef>,
    /// Ledger-side report handle.
    pub ledger_report_ref: String,
    /// Plaintext, set on first decryption.
    pub decrypted_content: Option<Vec<u8>>,
    /// Advisory annotation, if one was produced.
    pub annotation: Option<Annotation>,
    /// Current status.
    pub status: ReportStatus,
    /// Ballots accepted so far. Bumped with every ballot so a verdict
    /// computed from a stale ballot set fails its compare-and-swap.
    pub ballot_count: u32,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

impl Report {
    /// Hash of a content address, used as the ledger idempotency key.
    pub fn hash_address(address: &str) -> Hash256 {
        Hash256::hash(address.as_bytes())
    }

    /// True while votes are accepted.
    pub fn is_votable(&self) -> bool {
        self.status == ReportStatus::UnderReview
    }

    /// Copy with `plaintext` recorded.
    ///
    /// Recording the same bytes again is accepted. Different bytes fail with
    /// `ContentDiverged` and leave the report untouched.
    pub fn with_decryption(&self, plaintext: &[u8]) -> Result<Self> {
        match &self.decrypted_content {
            Some(existing) if existing.as_slice() == plaintext => Ok(self.clone()),
            Some(_) => Err(CoreError::ContentDiverged(self.id)),
            None => {
                let mut next = self.clone();
                next.decrypted_content = Some(plaintext.to_vec());
                Ok(next)
            }
        }
    }

    /// Copy with an annotation attached.
    pub fn with_annotation(&self, annotation: Option<Annotation>) -> Self {
        let mut next = self.clone();
        next.annotation = annotation;
        next
    }

    /// Copy with one more ballot counted.
    pub fn with_ballot(&self) -> Self {
        let mut next = self.clone();
        next.ballot_count = next.ballot_count.saturating_add(1);
        next
    }

    /// Copy with the verdict applied.
    pub fn settled(&self, outcome: Outcome) -> Self {
        let mut next = self.clone();
        next.status = outcome.report_status();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        let session_id = SessionId::generate(8);
        Report {
            id: session_id.report_id(),
            session_id,
            owner: IdentityRef::derive("tg:1"),
            content_address: "b3:aa".into(),
            address_hash: Report::hash_address("b3:aa"),
            evidence: Vec::new(),
            ledger_report_ref: "rpt:1".into(),
            decrypted_content: None,
            annotation: None,
            status: ReportStatus::UnderReview,
            ballot_count: 0,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_decryption_is_write_once() {
        let report = report();
        let opened = report.with_decryption(b"plaintext").unwrap();
        assert_eq!(opened.decrypted_content.as_deref(), Some(b"plaintext".as_slice()));

        let again = opened.with_decryption(b"plaintext").unwrap();
        assert_eq!(again, opened);

        assert!(matches!(
            opened.with_decryption(b"different"),
            Err(CoreError::ContentDiverged(_))
        ));
    }

    #[test]
    fn test_settled_closes_voting() {
        let report = report();
        assert!(report.is_votable());
        let settled = report.settled(Outcome::Rejected);
        assert_eq!(settled.status, ReportStatus::Rejected);
        assert!(!settled.is_votable());
    }

    #[test]
    fn test_outcome_mappings() {
        assert_eq!(Outcome::Verified.as_vote(), Vote::Valid);
        assert_eq!(Outcome::Rejected.as_vote(), Vote::Invalid);
        assert_eq!(Outcome::Verified.session_status(), SessionStatus::Verified);
        assert_eq!(Outcome::Rejected.report_status(), ReportStatus::Rejected);
    }
}
