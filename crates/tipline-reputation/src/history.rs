//! Append-only score history with a fixed cap.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::score::{Score, HISTORY_CAP};

/// Which of the two scores an entry touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreKind {
    /// Reporter reputation.
    Reporter,
    /// Jury reputation.
    Jury,
}

impl std::fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reporter => write!(f, "reporter"),
            Self::Jury => write!(f, "jury"),
        }
    }
}

/// One recorded score change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Score that changed.
    pub kind: ScoreKind,
    /// Requested delta. The applied change can be smaller after clamping.
    pub delta: i32,
    /// Why it changed.
    pub reason: String,
    /// Value before, `None` if the score was uninitialized.
    pub old_value: Option<Score>,
    /// Value after.
    pub new_value: Score,
    /// When it changed.
    pub timestamp: DateTime<Utc>,
}

/// History capped at the most recent [`HISTORY_CAP`] entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    /// Empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, evicting the oldest entry once the cap is reached.
    pub fn push(&mut self, entry: HistoryEntry) {
        while self.entries.len() >= HISTORY_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(delta: i32) -> HistoryEntry {
        HistoryEntry {
            kind: ScoreKind::Reporter,
            delta,
            reason: format!("update {delta}"),
            old_value: Some(Score::DEFAULT),
            new_value: Score::DEFAULT,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_fifo_eviction() {
        let mut history = History::new();
        for i in 0..60 {
            history.push(entry(i));
        }
        assert_eq!(history.len(), HISTORY_CAP);
        let deltas: Vec<i32> = history.iter().map(|e| e.delta).collect();
        assert_eq!(deltas.first(), Some(&10));
        assert_eq!(deltas.last(), Some(&59));
    }

    #[test]
    fn test_latest() {
        let mut history = History::new();
        assert!(history.latest().is_none());
        history.push(entry(1));
        history.push(entry(2));
        assert_eq!(history.latest().map(|e| e.delta), Some(2));
    }
}
