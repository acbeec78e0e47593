//! In-memory record store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tipline_jury::{JuryVote, ReportId, BALLOT_KEY_SIZE};
use tipline_reputation::{IdentityRef, ReputationRecord};

use super::{RecordStore, StoreError, StoreResult};
use crate::report::Report;
use crate::session::{Session, SessionId};

#[derive(Debug, Default)]
struct Records {
    sessions: HashMap<SessionId, Session>,
    reports: HashMap<ReportId, Report>,
    votes: BTreeMap<[u8; BALLOT_KEY_SIZE], JuryVote>,
    reputation: HashMap<IdentityRef, ReputationRecord>,
}

impl Records {
    fn check_session(&self, current: &Session) -> StoreResult<()> {
        match self.sessions.get(&current.id) {
            Some(stored) if stored == current => Ok(()),
            Some(_) => Err(StoreError::Conflict(format!("session {} changed", current.id))),
            None => Err(StoreError::NotFound(format!("session {}", current.id))),
        }
    }

    fn check_report(&self, current: &Report) -> StoreResult<()> {
        match self.reports.get(&current.id) {
            Some(stored) if stored == current => Ok(()),
            Some(_) => Err(StoreError::Conflict(format!("report {} changed", current.id))),
            None => Err(StoreError::NotFound(format!("report {}", current.id))),
        }
    }

    fn put_reputation(&mut self, records: &[ReputationRecord]) {
        for record in records {
            self.reputation.insert(record.identity().clone(), record.clone());
        }
    }
}

/// Record store held in process memory.
///
/// One lock covers every map, so each operation is atomic with respect to
/// all others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut records = self.write()?;
        if records.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!("session {} exists", session.id)));
        }
        records.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        Ok(self.read()?.sessions.get(id).cloned())
    }

    fn replace_session(&self, current: &Session, next: &Session) -> StoreResult<()> {
        let mut records = self.write()?;
        records.check_session(current)?;
        records.sessions.insert(next.id.clone(), next.clone());
        Ok(())
    }

    fn remove_session(&self, current: &Session) -> StoreResult<bool> {
        let mut records = self.write()?;
        match records.check_session(current) {
            Ok(()) => {
                records.sessions.remove(&current.id);
                Ok(true)
            }
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        Ok(self.read()?.sessions.values().cloned().collect())
    }

    fn commit_submission(
        &self,
        current: &Session,
        next: &Session,
        report: &Report,
    ) -> StoreResult<()> {
        let mut records = self.write()?;
        records.check_session(current)?;
        if records.reports.contains_key(&report.id) {
            return Err(StoreError::Conflict(format!("report {} exists", report.id)));
        }
        records.sessions.insert(next.id.clone(), next.clone());
        records.reports.insert(report.id, report.clone());
        Ok(())
    }

    fn get_report(&self, id: &ReportId) -> StoreResult<Option<Report>> {
        Ok(self.read()?.reports.get(id).cloned())
    }

    fn replace_report(&self, current: &Report, next: &Report) -> StoreResult<()> {
        let mut records = self.write()?;
        records.check_report(current)?;
        records.reports.insert(next.id, next.clone());
        Ok(())
    }

    fn commit_verdict(
        &self,
        current_session: &Session,
        next_session: &Session,
        current_report: &Report,
        next_report: &Report,
        reputation: &[ReputationRecord],
    ) -> StoreResult<()> {
        let mut records = self.write()?;
        records.check_session(current_session)?;
        records.check_report(current_report)?;
        records
            .sessions
            .insert(next_session.id.clone(), next_session.clone());
        records.reports.insert(next_report.id, next_report.clone());
        records.put_reputation(reputation);
        Ok(())
    }

    fn insert_vote(&self, vote: &JuryVote) -> StoreResult<()> {
        let mut records = self.write()?;
        let counted = match records.reports.get(&vote.report_id) {
            Some(report) if report.is_votable() => report.with_ballot(),
            Some(report) => {
                return Err(StoreError::Precondition(format!(
                    "report {} is {}",
                    report.id, report.status
                )))
            }
            None => return Err(StoreError::NotFound(format!("report {}", vote.report_id))),
        };

        let key = vote.key();
        if records.votes.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "ballot by {} on {}",
                vote.voter.short(),
                vote.report_id
            )));
        }
        records.votes.insert(key, vote.clone());
        records.reports.insert(counted.id, counted);
        Ok(())
    }

    fn votes_for(&self, report: &ReportId) -> StoreResult<Vec<JuryVote>> {
        let records = self.read()?;
        let mut start = [0u8; BALLOT_KEY_SIZE];
        start[..ReportId::SIZE].copy_from_slice(report.as_bytes());
        Ok(records
            .votes
            .range(start..)
            .take_while(|(key, _)| key.starts_with(report.as_bytes()))
            .map(|(_, vote)| vote.clone())
            .collect())
    }

    fn reputation_records(&self) -> StoreResult<Vec<ReputationRecord>> {
        Ok(self.read()?.reputation.values().cloned().collect())
    }

    fn save_reputation(&self, records: &[ReputationRecord]) -> StoreResult<()> {
        self.write()?.put_reputation(records);
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}
