//! Weighted tallies.
//!
//! Percentages are proportional to summed weight, not to the number of
//! voters: a weight-10 juror counts ten times a weight-1 juror.

use serde::{Deserialize, Serialize};

use crate::ballot::{JuryVote, Vote};

/// How a tie on summed weight is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreak {
    /// A tie is treated as an `Invalid` majority.
    #[default]
    FavorInvalid,
    /// A tie is treated as a `Valid` majority.
    FavorValid,
}

impl TieBreak {
    fn winner(self) -> Vote {
        match self {
            Self::FavorInvalid => Vote::Invalid,
            Self::FavorValid => Vote::Valid,
        }
    }
}

/// Summed ballot weights for one report.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    /// Summed weight of `Valid` ballots.
    pub valid_weight: u64,
    /// Summed weight of `Invalid` ballots.
    pub invalid_weight: u64,
    /// Share of the total weight voting `Valid`, 0 when empty.
    pub valid_percent: f64,
    /// Share of the total weight voting `Invalid`, 0 when empty.
    pub invalid_percent: f64,
    /// Number of ballots.
    pub voter_count: usize,
}

impl Tally {
    /// Tally a set of ballots.
    pub fn from_ballots<'a>(ballots: impl IntoIterator<Item = &'a JuryVote>) -> Self {
        let mut tally = Self::default();
        for ballot in ballots {
            let weight = u64::from(ballot.weight.value());
            match ballot.vote {
                Vote::Valid => tally.valid_weight += weight,
                Vote::Invalid => tally.invalid_weight += weight,
            }
            tally.voter_count += 1;
        }

        let total = tally.total_weight();
        if total > 0 {
            tally.valid_percent = (tally.valid_weight * 100) as f64 / total as f64;
            tally.invalid_percent = (tally.invalid_weight * 100) as f64 / total as f64;
        }
        tally
    }

    /// Summed weight of every ballot.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.valid_weight + self.invalid_weight
    }

    /// Majority under the default tie-break (ties go to `Invalid`).
    #[must_use]
    pub fn majority(&self) -> Vote {
        self.majority_with(TieBreak::default())
    }

    /// Majority under an explicit tie-break. An empty tally is a tie.
    #[must_use]
    pub fn majority_with(&self, tie_break: TieBreak) -> Vote {
        match self.valid_weight.cmp(&self.invalid_weight) {
            std::cmp::Ordering::Greater => Vote::Valid,
            std::cmp::Ordering::Less => Vote::Invalid,
            std::cmp::Ordering::Equal => tie_break.winner(),
        }
    }

    /// True if one side has strictly more weight.
    #[must_use]
    pub fn has_strict_majority(&self) -> bool {
        self.valid_weight != self.invalid_weight
    }

    /// Valid share rounded to a whole percent.
    #[must_use]
    pub fn valid_percent_rounded(&self) -> u8 {
        self.valid_percent.round() as u8
    }

    /// Invalid share rounded to a whole percent.
    #[must_use]
    pub fn invalid_percent_rounded(&self) -> u8 {
        self.invalid_percent.round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::{ReportId, VoteWeight};
    use tipline_reputation::IdentityRef;

    fn ballots(entries: &[(Vote, u8)]) -> Vec<JuryVote> {
        let report = ReportId::for_session("TALLY234");
        entries
            .iter()
            .enumerate()
            .map(|(i, (vote, weight))| {
                JuryVote::cast(
                    report,
                    IdentityRef::derive(&format!("juror:{i}")),
                    *vote,
                    VoteWeight::new(*weight),
                )
            })
            .collect()
    }

    #[test]
    fn test_weighted_percentages() {
        let tally = Tally::from_ballots(&ballots(&[(Vote::Valid, 3), (Vote::Invalid, 7)]));
        assert_eq!(tally.valid_weight, 3);
        assert_eq!(tally.invalid_weight, 7);
        assert_eq!(tally.valid_percent, 30.0);
        assert_eq!(tally.invalid_percent, 70.0);
        assert_eq!(tally.voter_count, 2);
        assert_eq!(tally.majority(), Vote::Invalid);
        assert!(tally.has_strict_majority());
    }

    #[test]
    fn test_weight_not_headcount() {
        let tally = Tally::from_ballots(&ballots(&[
            (Vote::Invalid, 2),
            (Vote::Valid, 5),
            (Vote::Valid, 8),
        ]));
        assert_eq!(tally.valid_weight, 13);
        assert_eq!(tally.valid_percent_rounded(), 87);
        assert_eq!(tally.invalid_percent_rounded(), 13);
        assert_eq!(tally.majority(), Vote::Valid);

        // One heavy juror outweighs several light ones.
        let tally = Tally::from_ballots(&ballots(&[
            (Vote::Valid, 1),
            (Vote::Valid, 1),
            (Vote::Valid, 1),
            (Vote::Invalid, 10),
        ]));
        assert_eq!(tally.majority(), Vote::Invalid);
    }

    #[test]
    fn test_tie_favors_invalid() {
        let tally = Tally::from_ballots(&ballots(&[(Vote::Valid, 5), (Vote::Invalid, 5)]));
        assert!(!tally.has_strict_majority());
        assert_eq!(tally.valid_percent, 50.0);
        assert_eq!(tally.majority(), Vote::Invalid);
        assert_eq!(tally.majority_with(TieBreak::FavorValid), Vote::Valid);
    }

    #[test]
    fn test_empty_tally() {
        let tally = Tally::from_ballots(&[]);
        assert_eq!(tally.voter_count, 0);
        assert_eq!(tally.valid_percent, 0.0);
        assert_eq!(tally.invalid_percent, 0.0);
        assert_eq!(tally.majority(), Vote::Invalid);
    }
}
