//! # tipline-core
//!
//! Anonymous report intake and adjudication.
//!
//! This is the main entry point for applications running a tip line.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tipline_core::{
//!     DeskConfig, MemoryContentStore, MemoryLedger, Outcome, ReportDesk, Submission,
//! };
//! use tipline_crypto::{seal, AuthorityKeyPair};
//!
//! let desk = ReportDesk::new(
//!     DeskConfig::in_memory(),
//!     AuthorityKeyPair::generate(),
//!     Arc::new(MemoryContentStore::new()),
//!     Arc::new(MemoryLedger::new()),
//! )?;
//!
//! let reporter = desk.resolve_identity("tg:4412")?;
//! let session = desk.create_session(&reporter)?;
//!
//! let body = seal(b"Invoices are being doubled", desk.authority_public_key())?;
//! let report = desk.submit(&session.id, Submission::new(body)).await?;
//!
//! let opened = desk.open_report(&report.id).await?;
//! desk.adjudicate(&session.id, Outcome::Verified, Some(500)).await?;
//! ```
//!
//! ## Session Lifecycle
//!
//! - **pending**: created, waiting for one submission until it expires
//! - **under_review**: submitted; the report accepts jury ballots
//! - **verified** / **rejected**: settled, terminal
//! - **closed**: expired without a submission, terminal and sweepable
//!
//! ## Architecture
//!
//! - **ReportDesk**: validates transitions and commits them atomically
//! - **RecordStore**: sessions, reports and ballots with compare-and-swap
//!   writes (in memory or sled)
//! - **ContentStore** / **Ledger**: external collaborators behind traits
//! - **AdvisoryAnnotator**: optional triage hints, never a gate

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod annotation;
pub mod config;
pub mod desk;
pub mod error;
pub mod external;
pub mod report;
pub mod session;
pub mod store;
pub mod time;

pub use annotation::{
    annotate_advisory, AdvisoryAnnotator, Annotation, CachedAnnotator, KeywordAnnotator, Urgency,
};
pub use config::{ConfigError, DeskConfig, DeskConfigBuilder};
pub use desk::{ExternalStanding, OpenedReport, ReportDesk, Submission};
pub use error::{Action, CoreError, LifecycleError, Result};
pub use external::{
    ContentStore, ExternalError, ExternalResult, Ledger, MemoryContentStore, MemoryLedger,
    Settlement,
};
pub use report::{EvidenceRef, Outcome, Report, ReportStatus};
pub use session::{Session, SessionId, SessionStatus, SubmissionReceipt, CODE_ALPHABET};
pub use store::{MemoryStore, RecordStore, SledStore, StoreError, StoreResult, StoredReputation};
pub use time::{Clock, ManualClock, SystemClock};
