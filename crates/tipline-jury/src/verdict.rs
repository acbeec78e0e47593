//! Juror reputation adjustments after a verdict.
//!
//! Jurors are scored against the jury's own majority, not against the final
//! outcome. [`VerdictSummary::majority_matches_verdict`] records when the two
//! disagree.

use serde::{Deserialize, Serialize};
use tipline_reputation::Adjustment;

use crate::ballot::{JuryVote, ReportId, Vote};
use crate::tally::{Tally, TieBreak};

/// Jury reputation deltas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JuryPolicy {
    /// Applied to every juror who voted.
    pub participation_bonus: i32,
    /// Applied when the ballot matches the majority.
    pub majority_bonus: i32,
    /// Applied when it does not.
    pub minority_penalty: i32,
    /// How a tie is resolved.
    pub tie_break: TieBreak,
}

impl Default for JuryPolicy {
    fn default() -> Self {
        Self {
            participation_bonus: 1,
            majority_bonus: 3,
            minority_penalty: -1,
            tie_break: TieBreak::FavorInvalid,
        }
    }
}

/// Adjustments for every ballot on a report.
///
/// Each juror gets a participation entry and an alignment entry, so the
/// history shows both.
pub fn juror_adjustments(
    ballots: &[JuryVote],
    majority: Vote,
    policy: &JuryPolicy,
) -> Vec<Adjustment> {
    let mut adjustments = Vec::with_capacity(ballots.len() * 2);
    for ballot in ballots {
        adjustments.push(Adjustment::jury(
            ballot.voter.clone(),
            policy.participation_bonus,
            format!("jury participation on {}", ballot.report_id),
        ));
        if ballot.vote == majority {
            adjustments.push(Adjustment::jury(
                ballot.voter.clone(),
                policy.majority_bonus,
                format!("voted with majority on {}", ballot.report_id),
            ));
        } else {
            adjustments.push(Adjustment::jury(
                ballot.voter.clone(),
                policy.minority_penalty,
                format!("voted against majority on {}", ballot.report_id),
            ));
        }
    }
    adjustments
}

/// Outcome of finalizing a jury.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerdictSummary {
    /// Report finalized.
    pub report_id: ReportId,
    /// Tally at finalization.
    pub tally: Tally,
    /// Jury majority after the tie-break.
    pub majority: Vote,
    /// Final outcome, as a vote.
    pub verdict: Vote,
    /// Whether the jury majority agreed with the final outcome.
    pub majority_matches_verdict: bool,
    /// Adjustments applied to the jurors.
    pub adjustments: Vec<Adjustment>,
}

impl VerdictSummary {
    /// Tally the ballots and compute juror adjustments.
    pub fn compute(
        report_id: ReportId,
        ballots: &[JuryVote],
        verdict: Vote,
        policy: &JuryPolicy,
    ) -> Self {
        let tally = Tally::from_ballots(ballots);
        let majority = tally.majority_with(policy.tie_break);
        let adjustments = juror_adjustments(ballots, majority, policy);
        Self {
            report_id,
            tally,
            majority,
            verdict,
            majority_matches_verdict: majority == verdict,
            adjustments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::VoteWeight;
    use tipline_reputation::IdentityRef;

    fn ballot(handle: &str, vote: Vote, weight: u8) -> JuryVote {
        JuryVote::cast(
            ReportId::for_session("VERDICT2"),
            IdentityRef::derive(handle),
            vote,
            VoteWeight::new(weight),
        )
    }

    fn net_delta(adjustments: &[Adjustment], handle: &str) -> i32 {
        let id = IdentityRef::derive(handle);
        adjustments
            .iter()
            .filter(|a| a.identity == id)
            .map(|a| a.delta)
            .sum()
    }

    #[test]
    fn test_majority_alignment_deltas() {
        let ballots = vec![
            ballot("a", Vote::Invalid, 2),
            ballot("b", Vote::Valid, 5),
            ballot("c", Vote::Valid, 8),
        ];
        let adjustments = juror_adjustments(&ballots, Vote::Valid, &JuryPolicy::default());
        assert_eq!(adjustments.len(), 6);
        assert_eq!(net_delta(&adjustments, "a"), 0);
        assert_eq!(net_delta(&adjustments, "b"), 4);
        assert_eq!(net_delta(&adjustments, "c"), 4);
    }

    #[test]
    fn test_summary_flags_disagreement() {
        let ballots = vec![ballot("a", Vote::Valid, 9), ballot("b", Vote::Invalid, 1)];
        let summary = VerdictSummary::compute(
            ReportId::for_session("VERDICT2"),
            &ballots,
            Vote::Invalid,
            &JuryPolicy::default(),
        );
        assert_eq!(summary.majority, Vote::Valid);
        assert!(!summary.majority_matches_verdict);
        // Alignment follows the majority, not the verdict.
        assert_eq!(net_delta(&summary.adjustments, "a"), 4);
        assert_eq!(net_delta(&summary.adjustments, "b"), 0);
    }

    #[test]
    fn test_tie_break_drives_alignment() {
        let ballots = vec![ballot("a", Vote::Valid, 4), ballot("b", Vote::Invalid, 4)];
        let summary = VerdictSummary::compute(
            ReportId::for_session("VERDICT2"),
            &ballots,
            Vote::Invalid,
            &JuryPolicy::default(),
        );
        assert_eq!(summary.majority, Vote::Invalid);
        assert!(summary.majority_matches_verdict);
        assert_eq!(net_delta(&summary.adjustments, "b"), 4);
        assert_eq!(net_delta(&summary.adjustments, "a"), 0);
    }
}
