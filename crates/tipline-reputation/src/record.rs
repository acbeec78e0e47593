//! Per-identity reputation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{History, HistoryEntry, ScoreKind};
use crate::identity::IdentityRef;
use crate::score::Score;

/// Reputation held by one identity.
///
/// `None` means the score was never initialized, which keeps it distinct
/// from an earned score of zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    identity: IdentityRef,
    reporter: Option<Score>,
    jury: Option<Score>,
    history: History,
    created_at: DateTime<Utc>,
}

impl ReputationRecord {
    /// Fresh record with both scores at the default.
    #[must_use]
    pub fn new(identity: IdentityRef) -> Self {
        Self {
            identity,
            reporter: Some(Score::DEFAULT),
            jury: Some(Score::DEFAULT),
            history: History::new(),
            created_at: Utc::now(),
        }
    }

    /// Record whose scores have not been initialized yet.
    ///
    /// Only for loading records that predate defaults; the ledger repairs
    /// them with `ensure_initialized`.
    #[must_use]
    pub fn uninitialized(identity: IdentityRef) -> Self {
        Self {
            identity,
            reporter: None,
            jury: None,
            history: History::new(),
            created_at: Utc::now(),
        }
    }

    /// Owning identity.
    pub fn identity(&self) -> &IdentityRef {
        &self.identity
    }

    /// Raw reporter score.
    pub fn reporter(&self) -> Option<Score> {
        self.reporter
    }

    /// Raw jury score.
    pub fn jury(&self) -> Option<Score> {
        self.jury
    }

    /// Reporter score, reading uninitialized as the default.
    pub fn reporter_or_default(&self) -> Score {
        self.reporter.unwrap_or_default()
    }

    /// Jury score, reading uninitialized as the default.
    pub fn jury_or_default(&self) -> Score {
        self.jury.unwrap_or_default()
    }

    /// Score history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Vote weight from the current jury score.
    pub fn vote_weight(&self) -> u8 {
        self.jury_or_default().vote_weight()
    }

    fn slot(&mut self, kind: ScoreKind) -> &mut Option<Score> {
        match kind {
            ScoreKind::Reporter => &mut self.reporter,
            ScoreKind::Jury => &mut self.jury,
        }
    }

    /// Apply a delta and append the matching history entry together.
    pub(crate) fn adjust(
        &mut self,
        kind: ScoreKind,
        delta: i32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> HistoryEntry {
        let slot = self.slot(kind);
        let old_value = *slot;
        let new_value = old_value.unwrap_or_default().apply(delta);
        *slot = Some(new_value);

        let entry = HistoryEntry {
            kind,
            delta,
            reason: reason.to_string(),
            old_value,
            new_value,
            timestamp: now,
        };
        self.history.push(entry.clone());
        entry
    }

    /// Set uninitialized scores to the default. Returns how many were repaired.
    pub(crate) fn repair(&mut self, now: DateTime<Utc>) -> usize {
        let mut repaired = 0;
        for kind in [ScoreKind::Reporter, ScoreKind::Jury] {
            let slot = self.slot(kind);
            if slot.is_none() {
                *slot = Some(Score::DEFAULT);
                self.history.push(HistoryEntry {
                    kind,
                    delta: i32::from(Score::DEFAULT.value()),
                    reason: "initialized to default".to_string(),
                    old_value: None,
                    new_value: Score::DEFAULT,
                    timestamp: now,
                });
                repaired += 1;
            }
        }
        repaired
    }
}
