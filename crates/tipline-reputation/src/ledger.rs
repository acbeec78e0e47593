//! The reputation ledger.
//!
//! Owns every `ReputationRecord`. Scores move only through the update
//! operations here, and each update changes the score and appends its
//! history entry under one write lock, so a reader never observes one
//! without the other.
//!
//! A ledger opened over a [`ReputationStore`] writes every changed record
//! through to the store while still holding the lock, and installs the change
//! in memory only once the write succeeded.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ReputationError, Result};
use crate::history::{HistoryEntry, ScoreKind};
use crate::identity::IdentityRef;
use crate::record::ReputationRecord;

/// One pending score change, for [`ReputationLedger::apply_batch`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    /// Identity to adjust.
    pub identity: IdentityRef,
    /// Which score.
    pub kind: ScoreKind,
    /// Signed delta, clamped on application.
    pub delta: i32,
    /// Reason recorded in history.
    pub reason: String,
}

impl Adjustment {
    /// Reporter score adjustment.
    pub fn reporter(identity: IdentityRef, delta: i32, reason: impl Into<String>) -> Self {
        Self {
            identity,
            kind: ScoreKind::Reporter,
            delta,
            reason: reason.into(),
        }
    }

    /// Jury score adjustment.
    pub fn jury(identity: IdentityRef, delta: i32, reason: impl Into<String>) -> Self {
        Self {
            identity,
            kind: ScoreKind::Jury,
            delta,
            reason: reason.into(),
        }
    }
}

/// Durable home for reputation records.
pub trait ReputationStore: Send + Sync {
    /// Every stored record.
    fn load(&self) -> Result<Vec<ReputationRecord>>;

    /// Write `records`, replacing the stored version of each.
    fn save(&self, records: &[ReputationRecord]) -> Result<()>;
}

type Records = HashMap<IdentityRef, ReputationRecord>;

/// Thread-safe store of reputation records.
#[derive(Default)]
pub struct ReputationLedger {
    records: RwLock<Records>,
    store: Option<Arc<dyn ReputationStore>>,
}

impl std::fmt::Debug for ReputationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReputationLedger")
            .field("records", &self.records.read().map(|r| r.len()).ok())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl ReputationLedger {
    /// Empty ledger held only in memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger backed by `store`, starting from the records it holds.
    ///
    /// Loading only inserts: if the store yields the same identity twice the
    /// first record wins.
    pub fn open(store: Arc<dyn ReputationStore>) -> Result<Self> {
        let mut records = Records::new();
        for record in store.load()? {
            records
                .entry(record.identity().clone())
                .or_insert(record);
        }
        info!(records = records.len(), "Reputation ledger loaded");
        Ok(Self {
            records: RwLock::new(records),
            store: Some(store),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|e| ReputationError::Unavailable(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|e| ReputationError::Unavailable(e.to_string()))
    }

    fn persist(&self, records: &[ReputationRecord]) -> Result<()> {
        match &self.store {
            Some(store) => store.save(records),
            None => Ok(()),
        }
    }

    /// Insert a default record unless one exists.
    ///
    /// Insert-or-fetch under the write lock: two racing registrations of the
    /// same identity produce one record, and exactly one caller sees `true`.
    pub fn register(&self, identity: &IdentityRef) -> Result<bool> {
        let mut records = self.write()?;
        if records.contains_key(identity) {
            return Ok(false);
        }
        let record = ReputationRecord::new(identity.clone());
        self.persist(std::slice::from_ref(&record))?;
        records.insert(identity.clone(), record);
        info!(identity = %identity.short(), "Registered reputation record");
        Ok(true)
    }

    /// Adjust reporter reputation.
    ///
    /// # Errors
    ///
    /// `IdentityNotFound` if the identity was never registered. No record
    /// is created.
    pub fn update_reporter(
        &self,
        identity: &IdentityRef,
        delta: i32,
        reason: &str,
    ) -> Result<HistoryEntry> {
        self.update(Adjustment::reporter(identity.clone(), delta, reason))
    }

    /// Adjust jury reputation. Same contract as [`Self::update_reporter`].
    pub fn update_jury(
        &self,
        identity: &IdentityRef,
        delta: i32,
        reason: &str,
    ) -> Result<HistoryEntry> {
        self.update(Adjustment::jury(identity.clone(), delta, reason))
    }

    fn update(&self, adjustment: Adjustment) -> Result<HistoryEntry> {
        let entry = self
            .apply_batch(std::slice::from_ref(&adjustment))?
            .pop()
            .ok_or_else(|| ReputationError::IdentityNotFound(adjustment.identity.short()))?;
        debug!(
            identity = %adjustment.identity.short(),
            kind = %adjustment.kind,
            delta = adjustment.delta,
            new_value = entry.new_value.value(),
            reason = %adjustment.reason,
            "Reputation updated"
        );
        Ok(entry)
    }

    /// Apply several adjustments as one unit.
    ///
    /// Every identity is checked before any record changes, so either all
    /// adjustments land or none do.
    pub fn apply_batch(&self, adjustments: &[Adjustment]) -> Result<Vec<HistoryEntry>> {
        self.apply_batch_with(adjustments, |next| self.persist(next))
    }

    /// Apply several adjustments, handing the resulting records to `commit`
    /// before they become visible.
    ///
    /// `commit` runs under the write lock with one updated copy of each
    /// touched record. If it fails, nothing changes and its error is
    /// returned. This lets a caller write the records in the same durable
    /// transaction as other state.
    pub fn apply_batch_with<E, F>(
        &self,
        adjustments: &[Adjustment],
        commit: F,
    ) -> std::result::Result<Vec<HistoryEntry>, E>
    where
        E: From<ReputationError>,
        F: FnOnce(&[ReputationRecord]) -> std::result::Result<(), E>,
    {
        let mut records = self.write()?;
        let now = Utc::now();
        let mut touched: Vec<ReputationRecord> = Vec::new();
        let mut entries = Vec::with_capacity(adjustments.len());
        for adjustment in adjustments {
            let position = match touched
                .iter()
                .position(|r| r.identity() == &adjustment.identity)
            {
                Some(position) => position,
                None => {
                    let record = records.get(&adjustment.identity).ok_or_else(|| {
                        ReputationError::IdentityNotFound(adjustment.identity.short())
                    })?;
                    touched.push(record.clone());
                    touched.len() - 1
                }
            };
            entries.push(touched[position].adjust(
                adjustment.kind,
                adjustment.delta,
                &adjustment.reason,
                now,
            ));
        }

        commit(&touched)?;
        let count = touched.len();
        for record in touched {
            records.insert(record.identity().clone(), record);
        }
        debug!(adjustments = entries.len(), records = count, "Applied reputation batch");
        Ok(entries)
    }

    /// Initialize any unset score to the default, recording each repair.
    ///
    /// An earned score of zero is left alone. Returns the number of scores
    /// repaired.
    pub fn ensure_initialized(&self, identity: &IdentityRef) -> Result<usize> {
        let mut records = self.write()?;
        let mut record = records
            .get(identity)
            .cloned()
            .ok_or_else(|| ReputationError::IdentityNotFound(identity.short()))?;
        let repaired = record.repair(Utc::now());
        if repaired > 0 {
            self.persist(std::slice::from_ref(&record))?;
            records.insert(identity.clone(), record);
            info!(identity = %identity.short(), repaired, "Initialized reputation scores");
        }
        Ok(repaired)
    }

    /// Current vote weight, recomputed from the jury score on every call.
    pub fn vote_weight(&self, identity: &IdentityRef) -> Result<u8> {
        let records = self.read()?;
        records
            .get(identity)
            .map(ReputationRecord::vote_weight)
            .ok_or_else(|| ReputationError::IdentityNotFound(identity.short()))
    }

    /// Copy of the record.
    pub fn snapshot(&self, identity: &IdentityRef) -> Result<ReputationRecord> {
        let records = self.read()?;
        records
            .get(identity)
            .cloned()
            .ok_or_else(|| ReputationError::IdentityNotFound(identity.short()))
    }

    /// True if a record exists.
    pub fn contains(&self, identity: &IdentityRef) -> Result<bool> {
        Ok(self.read()?.contains_key(identity))
    }

    /// First identity in `identities` that has no record, if any.
    pub fn find_missing<'a, I>(&self, identities: I) -> Result<Option<&'a IdentityRef>>
    where
        I: IntoIterator<Item = &'a IdentityRef>,
    {
        let records = self.read()?;
        Ok(identities.into_iter().find(|id| !records.contains_key(*id)))
    }

    /// Number of records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// True when no records exist.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }
}
