//! Sled-backed record store.
//!
//! Uses four sled trees:
//! - `tipline_sessions`: session code → bincode `Session`
//! - `tipline_reports`: report id (16 bytes) → bincode `Report`
//! - `tipline_votes`: report id ‖ voter (48 bytes) → bincode `JuryVote`
//! - `tipline_reputation`: identity (32 bytes) → bincode `ReputationRecord`
//!
//! Single-record writes use `compare_and_swap` against the encoded bytes
//! the caller read. Writes that span trees run in a sled transaction.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::{CompareAndSwapError, Transactional};
use tipline_jury::{JuryVote, ReportId};
use tipline_reputation::ReputationRecord;

use super::{RecordStore, StoreError, StoreResult};
use crate::report::Report;
use crate::session::{Session, SessionId};

/// Tree name for sessions.
const SESSIONS_TREE: &str = "tipline_sessions";

/// Tree name for reports.
const REPORTS_TREE: &str = "tipline_reports";

/// Tree name for ballots.
const VOTES_TREE: &str = "tipline_votes";

/// Tree name for reputation records.
const REPUTATION_TREE: &str = "tipline_reputation";

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode_records(records: &[ReputationRecord]) -> StoreResult<Vec<([u8; 32], Vec<u8>)>> {
    records
        .iter()
        .map(|record| Ok((*record.identity().as_bytes(), encode(record)?)))
        .collect()
}

fn abort<T>(error: StoreError) -> ConflictableTransactionResult<T, StoreError> {
    Err(ConflictableTransactionError::Abort(error))
}

fn db_error(e: sled::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn tx_error(e: TransactionError<StoreError>) -> StoreError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => db_error(e),
    }
}

fn cas_error(what: String, e: CompareAndSwapError) -> StoreError {
    if e.current.is_none() {
        StoreError::NotFound(what)
    } else {
        StoreError::Conflict(format!("{what} changed"))
    }
}

/// Persistent record store backed by sled.
///
/// ## Thread Safety
///
/// `SledStore` is thread-safe. All sled operations are internally synchronized.
pub struct SledStore {
    db: sled::Db,
    sessions: sled::Tree,
    reports: sled::Tree,
    votes: sled::Tree,
    reputation: sled::Tree,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("sessions", &self.sessions.len())
            .field("reports", &self.reports.len())
            .field("votes", &self.votes.len())
            .field("reputation", &self.reputation.len())
            .finish()
    }
}

impl SledStore {
    /// Open or create a store under `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::LowSpace)
            .flush_every_ms(Some(1000))
            .open()
            .map_err(|e| StoreError::Database(format!("sled open: {e}")))?;
        Self::from_db(db)
    }

    /// Store in a temporary directory removed on drop.
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Database(format!("sled open: {e}")))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        let sessions = db
            .open_tree(SESSIONS_TREE)
            .map_err(|e| StoreError::Database(format!("open sessions tree: {e}")))?;
        let reports = db
            .open_tree(REPORTS_TREE)
            .map_err(|e| StoreError::Database(format!("open reports tree: {e}")))?;
        let votes = db
            .open_tree(VOTES_TREE)
            .map_err(|e| StoreError::Database(format!("open votes tree: {e}")))?;
        let reputation = db
            .open_tree(REPUTATION_TREE)
            .map_err(|e| StoreError::Database(format!("open reputation tree: {e}")))?;
        Ok(Self {
            db,
            sessions,
            reports,
            votes,
            reputation,
        })
    }
}

impl RecordStore for SledStore {
    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let bytes = encode(session)?;
        self.sessions
            .compare_and_swap(session.id.as_str(), None::<&[u8]>, Some(bytes))
            .map_err(db_error)?
            .map_err(|_| StoreError::Conflict(format!("session {} exists", session.id)))
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        self.sessions
            .get(id.as_str())
            .map_err(db_error)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn replace_session(&self, current: &Session, next: &Session) -> StoreResult<()> {
        let old = encode(current)?;
        let new = encode(next)?;
        self.sessions
            .compare_and_swap(current.id.as_str(), Some(old), Some(new))
            .map_err(db_error)?
            .map_err(|e| cas_error(format!("session {}", current.id), e))
    }

    fn remove_session(&self, current: &Session) -> StoreResult<bool> {
        let old = encode(current)?;
        match self
            .sessions
            .compare_and_swap(current.id.as_str(), Some(old), None::<&[u8]>)
            .map_err(db_error)?
        {
            Ok(()) => Ok(true),
            Err(e) if e.current.is_none() => Ok(false),
            Err(e) => Err(cas_error(format!("session {}", current.id), e)),
        }
    }

    fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        self.sessions
            .iter()
            .values()
            .map(|bytes| decode(&bytes.map_err(db_error)?))
            .collect()
    }

    fn commit_submission(
        &self,
        current: &Session,
        next: &Session,
        report: &Report,
    ) -> StoreResult<()> {
        let session_key = current.id.as_str().as_bytes();
        let old = encode(current)?;
        let new = encode(next)?;
        let report_bytes = encode(report)?;
        let report_key = report.id.as_bytes();

        (&self.sessions, &self.reports)
            .transaction(|(sessions, reports)| {
                match sessions.get(session_key)? {
                    Some(stored) if stored.as_ref() == old.as_slice() => {}
                    Some(_) => {
                        return abort(StoreError::Conflict(format!(
                            "session {} changed",
                            current.id
                        )))
                    }
                    None => return abort(StoreError::NotFound(format!("session {}", current.id))),
                }
                if reports.get(report_key)?.is_some() {
                    return abort(StoreError::Conflict(format!("report {} exists", report.id)));
                }
                sessions.insert(session_key, new.as_slice())?;
                reports.insert(&report_key[..], report_bytes.as_slice())?;
                Ok(())
            })
            .map_err(tx_error)
    }

    fn get_report(&self, id: &ReportId) -> StoreResult<Option<Report>> {
        self.reports
            .get(id.as_bytes())
            .map_err(db_error)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn replace_report(&self, current: &Report, next: &Report) -> StoreResult<()> {
        let old = encode(current)?;
        let new = encode(next)?;
        self.reports
            .compare_and_swap(current.id.as_bytes(), Some(old), Some(new))
            .map_err(db_error)?
            .map_err(|e| cas_error(format!("report {}", current.id), e))
    }

    fn commit_verdict(
        &self,
        current_session: &Session,
        next_session: &Session,
        current_report: &Report,
        next_report: &Report,
        reputation: &[ReputationRecord],
    ) -> StoreResult<()> {
        let session_key = current_session.id.as_str().as_bytes();
        let report_key = current_report.id.as_bytes();
        let old_session = encode(current_session)?;
        let new_session = encode(next_session)?;
        let old_report = encode(current_report)?;
        let new_report = encode(next_report)?;
        let records = encode_records(reputation)?;

        (&self.sessions, &self.reports, &self.reputation)
            .transaction(|(sessions, reports, scores)| {
                match sessions.get(session_key)? {
                    Some(stored) if stored.as_ref() == old_session.as_slice() => {}
                    Some(_) => {
                        return abort(StoreError::Conflict(format!(
                            "session {} changed",
                            current_session.id
                        )))
                    }
                    None => {
                        return abort(StoreError::NotFound(format!(
                            "session {}",
                            current_session.id
                        )))
                    }
                }
                match reports.get(report_key)? {
                    Some(stored) if stored.as_ref() == old_report.as_slice() => {}
                    Some(_) => {
                        return abort(StoreError::Conflict(format!(
                            "report {} changed",
                            current_report.id
                        )))
                    }
                    None => {
                        return abort(StoreError::NotFound(format!(
                            "report {}",
                            current_report.id
                        )))
                    }
                }
                sessions.insert(session_key, new_session.as_slice())?;
                reports.insert(&report_key[..], new_report.as_slice())?;
                for (identity, bytes) in &records {
                    scores.insert(&identity[..], bytes.as_slice())?;
                }
                Ok(())
            })
            .map_err(tx_error)
    }

    fn insert_vote(&self, vote: &JuryVote) -> StoreResult<()> {
        let report_key = vote.report_id.as_bytes();
        let vote_key = vote.key();
        let vote_bytes = encode(vote)?;

        (&self.reports, &self.votes)
            .transaction(|(reports, votes)| {
                let report: Report = match reports.get(report_key)? {
                    Some(bytes) => match decode(&bytes) {
                        Ok(report) => report,
                        Err(e) => return abort(e),
                    },
                    None => {
                        return abort(StoreError::NotFound(format!("report {}", vote.report_id)))
                    }
                };
                if !report.is_votable() {
                    return abort(StoreError::Precondition(format!(
                        "report {} is {}",
                        report.id, report.status
                    )));
                }
                if votes.get(&vote_key[..])?.is_some() {
                    return abort(StoreError::Conflict(format!(
                        "ballot by {} on {}",
                        vote.voter.short(),
                        vote.report_id
                    )));
                }
                let counted = match encode(&report.with_ballot()) {
                    Ok(bytes) => bytes,
                    Err(e) => return abort(e),
                };
                votes.insert(&vote_key[..], vote_bytes.as_slice())?;
                reports.insert(&report_key[..], counted)?;
                Ok(())
            })
            .map_err(tx_error)
    }

    fn votes_for(&self, report: &ReportId) -> StoreResult<Vec<JuryVote>> {
        self.votes
            .scan_prefix(report.as_bytes())
            .values()
            .map(|bytes| decode(&bytes.map_err(db_error)?))
            .collect()
    }

    fn reputation_records(&self) -> StoreResult<Vec<ReputationRecord>> {
        self.reputation
            .iter()
            .values()
            .map(|bytes| decode(&bytes.map_err(db_error)?))
            .collect()
    }

    fn save_reputation(&self, records: &[ReputationRecord]) -> StoreResult<()> {
        let mut batch = sled::Batch::default();
        for (identity, bytes) in encode_records(records)? {
            batch.insert(&identity[..], bytes);
        }
        self.reputation.apply_batch(batch).map_err(db_error)
    }

    fn flush(&self) -> StoreResult<()> {
        self.db.flush().map(|_| ()).map_err(db_error)
    }
}
