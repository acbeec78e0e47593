//! Durable records: sessions, reports, ballots and reputation.
//!
//! Every write is either an insert-if-absent or a compare-and-swap against
//! the version the caller read, so of two racing writers exactly one wins
//! and the other gets [`StoreError::Conflict`]. Multi-record transitions
//! (`commit_submission`, `commit_verdict`, `insert_vote`) are single atomic
//! operations.
//!
//! Reputation records are written by the reputation ledger under its own
//! write lock, so the store overwrites them without a compare-and-swap.
//!
//! ## Implementations
//!
//! - [`MemoryStore`]: one lock over all maps, for tests and demos
//! - [`SledStore`]: sled trees with transactions for the multi-record writes

mod memory;
mod sled_backend;

pub use self::memory::MemoryStore;
pub use self::sled_backend::SledStore;

use std::sync::Arc;

use thiserror::Error;
use tipline_jury::{JuryVote, ReportId};
use tipline_reputation::{ReputationError, ReputationRecord, ReputationStore};

use crate::report::Report;
use crate::session::{Session, SessionId};

/// Storage errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record changed or already exists.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A record the write depends on is in the wrong state.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Backend failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence for the desk's records.
///
/// ## Contract
///
/// Implementations MUST:
/// - Reject a session or ballot insert whose key exists with `Conflict`
/// - Apply a replace only if the stored record equals `current`
/// - Apply multi-record commits all-or-nothing
pub trait RecordStore: Send + Sync {
    /// Insert a new session.
    fn insert_session(&self, session: &Session) -> StoreResult<()>;

    /// Load a session.
    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    /// Swap `current` for `next`.
    fn replace_session(&self, current: &Session, next: &Session) -> StoreResult<()>;

    /// Delete `current`. Returns `false` if it was already gone.
    fn remove_session(&self, current: &Session) -> StoreResult<bool>;

    /// Every stored session.
    fn list_sessions(&self) -> StoreResult<Vec<Session>>;

    /// Swap the session and insert its report in one step.
    fn commit_submission(&self, current: &Session, next: &Session, report: &Report)
        -> StoreResult<()>;

    /// Load a report.
    fn get_report(&self, id: &ReportId) -> StoreResult<Option<Report>>;

    /// Swap `current` for `next`.
    fn replace_report(&self, current: &Report, next: &Report) -> StoreResult<()>;

    /// Swap the session and its report and write the settled reputation
    /// records in one step.
    fn commit_verdict(
        &self,
        current_session: &Session,
        next_session: &Session,
        current_report: &Report,
        next_report: &Report,
        reputation: &[ReputationRecord],
    ) -> StoreResult<()>;

    /// Insert a ballot if the voter has none on the report and the report
    /// is under review, bumping the report's ballot count.
    fn insert_vote(&self, vote: &JuryVote) -> StoreResult<()>;

    /// Ballots on a report.
    fn votes_for(&self, report: &ReportId) -> StoreResult<Vec<JuryVote>>;

    /// Every stored reputation record.
    fn reputation_records(&self) -> StoreResult<Vec<ReputationRecord>>;

    /// Write reputation records, replacing stored versions.
    fn save_reputation(&self, records: &[ReputationRecord]) -> StoreResult<()>;

    /// Flush pending writes. No-op in memory.
    fn flush(&self) -> StoreResult<()>;
}

/// Reputation persistence over a [`RecordStore`].
pub struct StoredReputation(Arc<dyn RecordStore>);

impl StoredReputation {
    /// Persist reputation records in `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self(store)
    }
}

impl ReputationStore for StoredReputation {
    fn load(&self) -> tipline_reputation::Result<Vec<ReputationRecord>> {
        self.0
            .reputation_records()
            .map_err(|e| ReputationError::Unavailable(e.to_string()))
    }

    fn save(&self, records: &[ReputationRecord]) -> tipline_reputation::Result<()> {
        self.0
            .save_reputation(records)
            .map_err(|e| ReputationError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Outcome, ReportStatus};
    use crate::session::{SessionStatus, SubmissionReceipt};
    use chrono::{Duration, Utc};
    use tipline_jury::{Vote, VoteWeight};
    use tipline_reputation::{IdentityRef, ReputationLedger};

    fn pending() -> Session {
        Session::new(
            SessionId::generate(8),
            IdentityRef::derive("tg:1"),
            Utc::now(),
            Duration::hours(24),
        )
    }

    fn submit(store: &dyn RecordStore, session: &Session) -> (Session, Report) {
        let next = session
            .submitted(
                Utc::now(),
                "b3:aa".into(),
                SubmissionReceipt {
                    tx_ref: "tx:1".into(),
                    report_ref: "rpt:1".into(),
                },
            )
            .unwrap();
        let report = Report {
            id: session.report_id(),
            session_id: session.id.clone(),
            owner: session.owner.clone(),
            content_address: "b3:aa".into(),
            address_hash: Report::hash_address("b3:aa"),
            evidence: Vec::new(),
            ledger_report_ref: "rpt:1".into(),
            decrypted_content: None,
            annotation: None,
            status: ReportStatus::UnderReview,
            ballot_count: 0,
            submitted_at: Utc::now(),
        };
        store.commit_submission(session, &next, &report).unwrap();
        (next, report)
    }

    fn ballot(report: &Report, voter: &str, vote: Vote) -> JuryVote {
        JuryVote::cast(report.id, IdentityRef::derive(voter), vote, VoteWeight::new(5))
    }

    fn exercise(store: &dyn RecordStore) {
        // Sessions: insert once, CAS replace.
        let session = pending();
        store.insert_session(&session).unwrap();
        assert!(matches!(store.insert_session(&session), Err(StoreError::Conflict(_))));
        assert_eq!(store.get_session(&session.id).unwrap(), Some(session.clone()));

        // Submission commits session and report together; a stale retry conflicts.
        let (review, report) = submit(store, &session);
        assert_eq!(
            store.get_session(&session.id).unwrap().map(|s| s.status),
            Some(SessionStatus::UnderReview)
        );
        assert_eq!(store.get_report(&report.id).unwrap(), Some(report.clone()));
        assert!(matches!(
            store.commit_submission(&session, &review, &report),
            Err(StoreError::Conflict(_))
        ));

        // Ballots are unique per voter and ordered by report prefix. Each
        // accepted ballot bumps the report's count.
        store.insert_vote(&ballot(&report, "a", Vote::Valid)).unwrap();
        store.insert_vote(&ballot(&report, "b", Vote::Invalid)).unwrap();
        assert!(matches!(
            store.insert_vote(&ballot(&report, "a", Vote::Invalid)),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.votes_for(&report.id).unwrap().len(), 2);
        let stale = report;
        let report = store.get_report(&stale.id).unwrap().unwrap();
        assert_eq!(report.ballot_count, 2);

        let other = pending();
        store.insert_session(&other).unwrap();
        let (_, other_report) = submit(store, &other);
        store.insert_vote(&ballot(&other_report, "a", Vote::Valid)).unwrap();
        assert_eq!(store.votes_for(&report.id).unwrap().len(), 2);
        assert_eq!(store.votes_for(&other_report.id).unwrap().len(), 1);

        // Reputation records are overwritten in place.
        let owner = review.owner.clone();
        let ledger = ReputationLedger::new();
        ledger.register(&owner).unwrap();
        store.save_reputation(&[ledger.snapshot(&owner).unwrap()]).unwrap();
        ledger.update_jury(&owner, 5, "participation").unwrap();
        let juror_record = ledger.snapshot(&owner).unwrap();
        store.save_reputation(&[juror_record.clone()]).unwrap();
        assert_eq!(store.reputation_records().unwrap(), vec![juror_record]);

        // Verdict commits both records and the reputation; a verdict built
        // before the last ballot conflicts and writes nothing.
        let settled_session = review
            .adjudicated(Outcome::Rejected, None, "tx:2".into())
            .unwrap();
        ledger.update_reporter(&owner, -15, "rejected").unwrap();
        let settled_record = ledger.snapshot(&owner).unwrap();
        assert!(matches!(
            store.commit_verdict(
                &review,
                &settled_session,
                &stale,
                &stale.settled(Outcome::Rejected),
                &[settled_record.clone()],
            ),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.get_session(&review.id).unwrap(), Some(review.clone()));
        assert_ne!(store.reputation_records().unwrap(), vec![settled_record.clone()]);

        let settled_report = report.settled(Outcome::Rejected);
        store
            .commit_verdict(
                &review,
                &settled_session,
                &report,
                &settled_report,
                &[settled_record.clone()],
            )
            .unwrap();
        assert_eq!(store.reputation_records().unwrap(), vec![settled_record.clone()]);
        assert!(matches!(
            store.commit_verdict(&review, &settled_session, &report, &settled_report, &[]),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.insert_vote(&ballot(&settled_report, "c", Vote::Valid)),
            Err(StoreError::Precondition(_))
        ));

        // Report CAS.
        let opened = settled_report.with_decryption(b"plain").unwrap();
        store.replace_report(&settled_report, &opened).unwrap();
        assert!(matches!(
            store.replace_report(&settled_report, &opened),
            Err(StoreError::Conflict(_))
        ));

        // Removal is a CAS delete.
        let doomed = pending();
        store.insert_session(&doomed).unwrap();
        assert!(store.remove_session(&doomed).unwrap());
        assert!(!store.remove_session(&doomed).unwrap());
        assert_eq!(store.get_session(&doomed.id).unwrap(), None);
        assert_eq!(store.list_sessions().unwrap().len(), 2);

        store.flush().unwrap();
    }

    #[test]
    fn test_memory_store_contract() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sled_store_contract() {
        exercise(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let session = pending();
        let record = {
            let store: Arc<dyn RecordStore> = Arc::new(SledStore::open(dir.path()).unwrap());
            store.insert_session(&session).unwrap();
            let ledger = ReputationLedger::open(Arc::new(StoredReputation::new(store.clone())))
                .unwrap();
            ledger.register(&session.owner).unwrap();
            ledger.update_reporter(&session.owner, -40, "rejected").unwrap();
            store.flush().unwrap();
            ledger.snapshot(&session.owner).unwrap()
        };
        let store: Arc<dyn RecordStore> = Arc::new(SledStore::open(dir.path()).unwrap());
        assert_eq!(store.get_session(&session.id).unwrap(), Some(session.clone()));
        let ledger = ReputationLedger::open(Arc::new(StoredReputation::new(store))).unwrap();
        assert_eq!(ledger.snapshot(&session.owner).unwrap(), record);
    }
}
