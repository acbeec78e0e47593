//! # tipline-reputation
//!
//! Reputation ledger for tipline reporters and jurors.
//!
//! Each identity holds two independent scores in `[0, 100]`:
//!
//! - **Reporter reputation** moves with verified and rejected submissions
//! - **Jury reputation** moves with participation and majority alignment,
//!   and sets the weight of the juror's votes
//!
//! Every change is recorded in a per-identity history capped at the 50 most
//! recent entries.
//!
//! ## Example
//!
//! ```
//! use tipline_reputation::{IdentityRef, ReputationLedger};
//!
//! let ledger = ReputationLedger::new();
//! let reporter = IdentityRef::derive("tg:1001");
//! ledger.register(&reporter).unwrap();
//!
//! ledger.update_reporter(&reporter, 10, "report verified").unwrap();
//! assert_eq!(ledger.snapshot(&reporter).unwrap().reporter_or_default().value(), 60);
//! assert_eq!(ledger.vote_weight(&reporter).unwrap(), 5);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod history;
pub mod identity;
pub mod ledger;
pub mod record;
pub mod score;

#[cfg(test)]
mod proptests;

pub use error::{ReputationError, Result};
pub use history::{History, HistoryEntry, ScoreKind};
pub use identity::IdentityRef;
pub use ledger::{Adjustment, ReputationLedger, ReputationStore};
pub use record::ReputationRecord;
pub use score::{limits, Score, HISTORY_CAP, SCORE_DEFAULT, SCORE_MAX, SCORE_MIN};
