//! Bounded reputation scores.

use serde::{Deserialize, Serialize};

/// Reputation score limits.
pub mod limits {
    /// Score assigned to a freshly initialized record.
    pub const SCORE_DEFAULT: u8 = 50;

    /// Maximum score.
    pub const SCORE_MAX: u8 = 100;

    /// Minimum score.
    pub const SCORE_MIN: u8 = 0;

    /// Most recent history entries kept per record.
    pub const HISTORY_CAP: usize = 50;

    /// Lightest vote a juror can cast.
    pub const VOTE_WEIGHT_MIN: u8 = 1;

    /// Heaviest vote a juror can cast.
    pub const VOTE_WEIGHT_MAX: u8 = 10;
}

pub use limits::*;

/// A score in `[0, 100]`.
///
/// The only way to move a score is [`Score::apply`], which clamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Score(u8);

impl Score {
    /// The default starting score (50).
    pub const DEFAULT: Score = Score(SCORE_DEFAULT);

    /// The lowest possible score. Earned, never a sentinel.
    pub const MIN: Score = Score(SCORE_MIN);

    /// The highest possible score.
    pub const MAX: Score = Score(SCORE_MAX);

    /// Create a score, clamping values above the maximum.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(SCORE_MAX))
    }

    /// Current value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Apply a signed delta and clamp into range.
    #[must_use]
    pub fn apply(self, delta: i32) -> Self {
        let next = (i64::from(self.0) + i64::from(delta))
            .clamp(i64::from(SCORE_MIN), i64::from(SCORE_MAX));
        // In range after the clamp.
        Self(next as u8)
    }

    /// Vote weight this score grants: `clamp(floor(score / 10), 1, 10)`.
    #[must_use]
    pub fn vote_weight(self) -> u8 {
        (self.0 / 10).clamp(VOTE_WEIGHT_MIN, VOTE_WEIGHT_MAX)
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps() {
        assert_eq!(Score::new(250).value(), 100);
        assert_eq!(Score::new(42).value(), 42);
    }

    #[test]
    fn test_apply_clamps_both_ends() {
        assert_eq!(Score::DEFAULT.apply(-100), Score::MIN);
        assert_eq!(Score::DEFAULT.apply(100), Score::MAX);
        assert_eq!(Score::DEFAULT.apply(10).value(), 60);
        assert_eq!(Score::DEFAULT.apply(i32::MIN), Score::MIN);
        assert_eq!(Score::DEFAULT.apply(i32::MAX), Score::MAX);
    }

    #[test]
    fn test_vote_weight() {
        assert_eq!(Score::new(0).vote_weight(), 1);
        assert_eq!(Score::new(9).vote_weight(), 1);
        assert_eq!(Score::new(19).vote_weight(), 1);
        assert_eq!(Score::new(20).vote_weight(), 2);
        assert_eq!(Score::DEFAULT.vote_weight(), 5);
        assert_eq!(Score::new(89).vote_weight(), 8);
        assert_eq!(Score::MAX.vote_weight(), 10);
    }
}
