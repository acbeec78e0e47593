//! # tipline-jury
//!
//! Reputation-weighted jury ballots for disputed reports.
//!
//! - One ballot per `(report, voter)`, weight frozen at cast time
//! - Tallies sum weights, so percentages follow weight rather than headcount
//! - Ties resolve to `Invalid` unless the policy says otherwise
//! - After a verdict every juror gets a participation bonus plus a bonus or
//!   penalty for matching the majority
//!
//! Ballot storage and the under-review check live with the report store;
//! this crate holds the pure rules.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ballot;
pub mod error;
pub mod tally;
pub mod verdict;

pub use ballot::{ballot_key, JuryVote, ReportId, Vote, VoteWeight, BALLOT_KEY_SIZE};
pub use error::{Result, VotingError};
pub use tally::{Tally, TieBreak};
pub use verdict::{juror_adjustments, JuryPolicy, VerdictSummary};
