//! Ballots and the identifiers they are keyed by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tipline_crypto::Hash256;
use tipline_reputation::{IdentityRef, Score};

/// Domain separator for report ids.
const REPORT_ID_DOMAIN: &[u8] = b"TIPLINE-REPORT-v1";

/// Length of a ballot key: report id then voter identity.
pub const BALLOT_KEY_SIZE: usize = ReportId::SIZE + IdentityRef::SIZE;

/// Identifier of a report.
///
/// Derived from the session code, so a session can bind at most one report.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportId([u8; 16]);

impl ReportId {
    /// Size in bytes.
    pub const SIZE: usize = 16;

    /// The report id bound to a session code.
    pub fn for_session(code: &str) -> Self {
        let digest = Hash256::hash_many(&[REPORT_ID_DOMAIN, code.as_bytes()]);
        let mut id = [0u8; Self::SIZE];
        id.copy_from_slice(&digest.as_bytes()[..Self::SIZE]);
        Self(id)
    }

    /// Rebuild from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; Self::SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Parse a 32-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Self::from_bytes(&bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReportId({})", self.to_hex())
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A juror's decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    /// The report is genuine.
    Valid,
    /// The report is not genuine.
    Invalid,
}

impl Vote {
    /// The other side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Valid => Self::Invalid,
            Self::Invalid => Self::Valid,
        }
    }
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// Weight of a ballot, in `1..=10`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VoteWeight(u8);

impl VoteWeight {
    /// Lightest weight.
    pub const MIN: VoteWeight = VoteWeight(1);
    /// Heaviest weight.
    pub const MAX: VoteWeight = VoteWeight(10);

    /// Clamp into `1..=10`.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// Weight granted by a jury score.
    #[must_use]
    pub fn from_score(score: Score) -> Self {
        Self::new(score.vote_weight())
    }

    /// Numeric value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

/// A cast ballot.
///
/// The weight is frozen when the ballot is cast; later reputation changes
/// do not reweight it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JuryVote {
    /// Report voted on.
    pub report_id: ReportId,
    /// Who voted.
    pub voter: IdentityRef,
    /// Decision.
    pub vote: Vote,
    /// Frozen weight.
    pub weight: VoteWeight,
    /// When the ballot was cast.
    pub cast_at: DateTime<Utc>,
}

impl JuryVote {
    /// Build a ballot stamped now.
    pub fn cast(report_id: ReportId, voter: IdentityRef, vote: Vote, weight: VoteWeight) -> Self {
        Self {
            report_id,
            voter,
            vote,
            weight,
            cast_at: Utc::now(),
        }
    }

    /// Uniqueness key: report id followed by voter.
    pub fn key(&self) -> [u8; BALLOT_KEY_SIZE] {
        ballot_key(&self.report_id, &self.voter)
    }
}

/// Storage key for the ballot of `voter` on `report`.
pub fn ballot_key(report: &ReportId, voter: &IdentityRef) -> [u8; BALLOT_KEY_SIZE] {
    let mut key = [0u8; BALLOT_KEY_SIZE];
    key[..ReportId::SIZE].copy_from_slice(report.as_bytes());
    key[ReportId::SIZE..].copy_from_slice(voter.as_bytes());
    key
}
