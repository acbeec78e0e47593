//! Error types for jury voting.

use thiserror::Error;

/// Errors that can occur while casting or tallying votes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VotingError {
    /// The voter already has a ballot on this report. Ballots are never
    /// overwritten.
    #[error("Duplicate vote on report {report} by {voter}")]
    DuplicateVote {
        /// Report the ballot targets.
        report: String,
        /// Voter that already voted.
        voter: String,
    },

    /// The report is not under review.
    #[error("Report is not open for voting: {0}")]
    ReportNotVotable(String),

    /// The voter has no reputation record.
    #[error("Unknown juror: {0}")]
    UnknownJuror(String),

    /// No report with this id.
    #[error("Report not found: {0}")]
    ReportNotFound(String),
}

/// Result type for voting operations.
pub type Result<T> = std::result::Result<T, VotingError>;
