//! The report desk: sessions, submissions, verdicts and jury votes.
//!
//! `ReportDesk` is the single entry point tying the lifecycle to its
//! collaborators. Each operation is a short request against shared state:
//!
//! 1. Validate against the current record
//! 2. Call external collaborators (pin, ledger) if the transition needs them
//! 3. Commit with a compare-and-swap against the record read in step 1
//!
//! A failure in step 2 leaves every record unchanged. Retrying is safe: the
//! content store deduplicates identical blobs, the ledger keys submissions
//! on the hash of the content address, and repeating a settlement with the
//! same outcome and reward returns the original transaction.
//!
//! Reputation records live in the same record store. A verdict writes the
//! session, the report and every reputation change in one commit.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tipline_crypto::{
    open, open_file, AuthorityKeyPair, FileMeta, SealedEnvelope, SealedFile, X25519PublicKey,
};
use tipline_jury::{JuryVote, ReportId, Tally, VerdictSummary, Vote, VoteWeight, VotingError};
use tipline_reputation::{
    Adjustment, IdentityRef, ReputationError, ReputationLedger, ReputationRecord,
};
use tracing::{debug, info, warn};

use crate::annotation::{annotate_advisory, AdvisoryAnnotator, CachedAnnotator, KeywordAnnotator};
use crate::config::{ConfigError, DeskConfig};
use crate::error::{CoreError, LifecycleError, Result};
use crate::external::{ContentStore, Ledger};
use crate::report::{EvidenceRef, Outcome, Report, ReportStatus};
use crate::session::{Session, SessionId};
use crate::store::{MemoryStore, RecordStore, SledStore, StoreError, StoredReputation};
use crate::time::{Clock, SystemClock};

/// Attempts to apply a report update that lost a compare-and-swap race.
const REPORT_UPDATE_ATTEMPTS: usize = 3;

/// Attempts to commit a verdict that lost a compare-and-swap race.
const VERDICT_ATTEMPTS: usize = 3;

/// What a reporter hands in: a sealed body and any sealed evidence files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Sealed report body.
    pub body: SealedEnvelope,
    /// Sealed evidence files.
    pub evidence: Vec<SealedFile>,
}

impl Submission {
    /// Submission with no evidence.
    pub fn new(body: SealedEnvelope) -> Self {
        Self {
            body,
            evidence: Vec::new(),
        }
    }

    /// Attach an evidence file.
    pub fn with_evidence(mut self, file: SealedFile) -> Self {
        self.evidence.push(file);
        self
    }
}

/// A report opened by the authority.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenedReport {
    /// The report with its decrypted content recorded.
    pub report: Report,
    /// Plaintext body.
    pub plaintext: Vec<u8>,
}

/// Standing reported by the external ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalStanding {
    /// Ledger-side reputation.
    pub reputation: u64,
    /// Rewards paid.
    pub rewards: u64,
}

/// Orchestrates the report lifecycle.
pub struct ReportDesk {
    config: DeskConfig,
    ttl: Duration,
    authority: AuthorityKeyPair,
    store: Arc<dyn RecordStore>,
    reputation: Arc<ReputationLedger>,
    content: Arc<dyn ContentStore>,
    ledger: Arc<dyn Ledger>,
    annotator: Option<Arc<dyn AdvisoryAnnotator>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ReportDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportDesk")
            .field("authority", self.authority.public_key())
            .field("ttl", &self.ttl)
            .field("annotator", &self.annotator.is_some())
            .finish()
    }
}

impl ReportDesk {
    /// Build a desk from validated configuration.
    ///
    /// Storage follows `config.storage`; reputation records are loaded from
    /// the same store. When annotation is enabled the desk
    /// uses a cached [`KeywordAnnotator`]; replace it with
    /// [`Self::with_annotator`].
    pub fn new(
        config: DeskConfig,
        authority: AuthorityKeyPair,
        content: Arc<dyn ContentStore>,
        ledger: Arc<dyn Ledger>,
    ) -> Result<Self> {
        config.validate()?;
        let ttl = Duration::from_std(config.session.ttl).map_err(|e| ConfigError::InvalidValue {
            field: "session.ttl".into(),
            reason: e.to_string(),
        })?;

        let store: Arc<dyn RecordStore> = if config.storage.in_memory {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(SledStore::open(&config.storage.data_dir)?)
        };
        let reputation = open_reputation(&store)?;
        let identities = reputation.len()?;

        let annotator: Option<Arc<dyn AdvisoryAnnotator>> = if config.annotation.enabled {
            Some(Arc::new(CachedAnnotator::new(
                KeywordAnnotator::new(),
                config.annotation.cache_capacity,
            )))
        } else {
            None
        };

        info!(
            authority = %authority.public_key().to_hex(),
            in_memory = config.storage.in_memory,
            identities,
            "Report desk ready"
        );

        Ok(Self {
            config,
            ttl,
            authority,
            store,
            reputation,
            content,
            ledger,
            annotator,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use a specific record store. The reputation ledger is reloaded from
    /// it.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Result<Self> {
        self.reputation = open_reputation(&store)?;
        self.store = store;
        Ok(self)
    }

    /// Use a specific clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace or remove the advisory annotator.
    pub fn with_annotator(mut self, annotator: Option<Arc<dyn AdvisoryAnnotator>>) -> Self {
        self.annotator = annotator;
        self
    }

    /// Public key reporters seal to.
    pub fn authority_public_key(&self) -> &X25519PublicKey {
        self.authority.public_key()
    }

    /// Active configuration.
    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// The reputation ledger.
    pub fn reputation_ledger(&self) -> &Arc<ReputationLedger> {
        &self.reputation
    }

    /// Flush the record store to durable storage.
    pub fn flush(&self) -> Result<()> {
        Ok(self.store.flush()?)
    }

    // ===== Identities =====

    /// Derive the identity for an external handle and make sure it has a
    /// reputation record. Safe to race: one record results.
    pub fn resolve_identity(&self, handle: &str) -> Result<IdentityRef> {
        let identity = IdentityRef::derive(handle);
        if self.reputation.register(&identity)? {
            debug!(identity = %identity.short(), "New identity");
        }
        Ok(identity)
    }

    /// Copy of an identity's reputation record.
    pub fn reputation(&self, identity: &IdentityRef) -> Result<ReputationRecord> {
        Ok(self.reputation.snapshot(identity)?)
    }

    /// Reputation and rewards according to the external ledger.
    pub async fn external_standing(&self, identity: &IdentityRef) -> Result<ExternalStanding> {
        let reputation = self.ledger.reputation(identity).await?;
        let rewards = self.ledger.rewards(identity).await?;
        Ok(ExternalStanding {
            reputation,
            rewards,
        })
    }

    // ===== Sessions =====

    /// Allocate a fresh pending session for `owner`.
    ///
    /// A generated code that is already taken is an insert conflict; the
    /// desk retries with a new code up to the configured attempts.
    pub fn create_session(&self, owner: &IdentityRef) -> Result<Session> {
        if !self.reputation.contains(owner)? {
            return Err(ReputationError::IdentityNotFound(owner.short()).into());
        }

        let attempts = self.config.session.allocation_attempts;
        for _ in 0..attempts {
            let id = SessionId::generate(self.config.session.code_length);
            let session = Session::new(id, owner.clone(), self.clock.now(), self.ttl);
            match self.store.insert_session(&session) {
                Ok(()) => {
                    info!(
                        session = %session.id,
                        expires_at = %session.expires_at,
                        "Session created"
                    );
                    return Ok(session);
                }
                Err(StoreError::Conflict(_)) => {
                    debug!("Session code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(CoreError::SessionIdExhausted(attempts))
    }

    /// Load a session. An expired pending session is closed and reported as
    /// `SessionExpired`.
    pub fn session(&self, id: &SessionId) -> Result<Session> {
        let session = self
            .store
            .get_session(id)?
            .ok_or_else(|| LifecycleError::SessionNotFound(id.clone()))?;

        let now = self.clock.now();
        if session.is_expired(now) {
            let closed = session.closed(now)?;
            match self.store.replace_session(&session, &closed) {
                Ok(()) => info!(session = %id, "Session expired and closed"),
                Err(StoreError::Conflict(_)) | Err(StoreError::NotFound(_)) => {
                    debug!(session = %id, "Session changed while closing")
                }
                Err(e) => return Err(e.into()),
            }
            return Err(LifecycleError::SessionExpired(id.clone()).into());
        }
        Ok(session)
    }

    /// Delete closed sessions and pending sessions past expiry.
    ///
    /// Sessions that change during the sweep are skipped. Returns how many
    /// were deleted.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        for session in self.store.list_sessions()? {
            if !session.is_sweepable(now) {
                continue;
            }
            match self.store.remove_session(&session) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(StoreError::Conflict(_)) => {
                    debug!(session = %session.id, "Session changed during sweep")
                }
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            info!(removed, "Swept expired sessions");
        }
        Ok(removed)
    }

    // ===== Submission =====

    /// Submit a sealed report to a pending session.
    ///
    /// Pins the body and each evidence file, records the submission on the
    /// ledger, then moves the session to `under_review` and creates its
    /// report in one atomic write. Of two racing submissions exactly one
    /// commits.
    pub async fn submit(&self, id: &SessionId, submission: Submission) -> Result<Report> {
        let session = self.session(id)?;
        session.check_submittable(self.clock.now())?;

        let body = submission.body.to_bytes()?;
        let content_address = self.content.put(&body).await?;

        let mut evidence = Vec::with_capacity(submission.evidence.len());
        for file in &submission.evidence {
            let bytes = file.envelope.to_bytes()?;
            let address = self.content.put(&bytes).await?;
            evidence.push(EvidenceRef {
                address,
                meta: file.meta.clone(),
            });
        }

        let address_hash = Report::hash_address(&content_address);
        let receipt = self
            .ledger
            .record_submission(&address_hash, &id.fingerprint(), &session.owner)
            .await?;

        let now = self.clock.now();
        let next = session.submitted(now, content_address.clone(), receipt.clone())?;
        let report = Report {
            id: session.report_id(),
            session_id: id.clone(),
            owner: session.owner.clone(),
            content_address,
            address_hash,
            evidence,
            ledger_report_ref: receipt.report_ref,
            decrypted_content: None,
            annotation: None,
            status: ReportStatus::UnderReview,
            ballot_count: 0,
            submitted_at: now,
        };

        match self.store.commit_submission(&session, &next, &report) {
            Ok(()) => {}
            Err(StoreError::Conflict(reason)) => {
                // Report the lifecycle reason if the winner moved the session.
                self.session(id)?.check_submittable(self.clock.now())?;
                return Err(StoreError::Conflict(reason).into());
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            session = %id,
            report = %report.id,
            evidence = report.evidence.len(),
            tx = %receipt.tx_ref,
            "Report submitted"
        );
        Ok(report)
    }

    /// Load a report.
    pub fn report(&self, id: &ReportId) -> Result<Report> {
        self.store
            .get_report(id)?
            .ok_or(CoreError::ReportNotFound(*id))
    }

    // ===== Authority access =====

    /// Decrypt a report body and record it.
    ///
    /// The first decryption sets the content and, when an annotator is
    /// configured, an advisory annotation. Later decryptions must produce
    /// the same bytes.
    pub async fn open_report(&self, id: &ReportId) -> Result<OpenedReport> {
        let report = self.report(id)?;
        let bytes = self.content.get(&report.content_address).await?;
        let envelope = SealedEnvelope::from_bytes(&bytes)?;
        let plaintext = open(&envelope, &self.authority)?;

        let annotation = match (&self.annotator, &report.annotation) {
            (Some(annotator), None) => {
                let context = evidence_context(&report.evidence);
                annotate_advisory(annotator.as_ref(), &plaintext, context.as_deref()).await
            }
            _ => None,
        };

        let mut current = report;
        for _ in 0..REPORT_UPDATE_ATTEMPTS {
            let mut next = current.with_decryption(&plaintext)?;
            if next.annotation.is_none() && annotation.is_some() {
                next = next.with_annotation(annotation.clone());
            }
            if next == current {
                return Ok(OpenedReport {
                    report: current,
                    plaintext,
                });
            }
            match self.store.replace_report(&current, &next) {
                Ok(()) => {
                    info!(report = %id, annotated = next.annotation.is_some(), "Report opened");
                    return Ok(OpenedReport {
                        report: next,
                        plaintext,
                    });
                }
                Err(StoreError::Conflict(_)) => {
                    current = self.report(id)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(format!("report {id} kept changing")).into())
    }

    /// Decrypt one evidence file. Returns its plaintext metadata and bytes.
    pub async fn open_evidence(&self, id: &ReportId, index: usize) -> Result<(FileMeta, Vec<u8>)> {
        let report = self.report(id)?;
        let evidence = report
            .evidence
            .get(index)
            .ok_or(CoreError::EvidenceNotFound { report: *id, index })?;
        let bytes = self.content.get(&evidence.address).await?;
        let file = SealedFile {
            meta: evidence.meta.clone(),
            envelope: SealedEnvelope::from_bytes(&bytes)?,
        };
        let plaintext = open_file(&file, &self.authority)?;
        debug!(report = %id, index, "Evidence opened");
        Ok((file.meta, plaintext))
    }

    // ===== Verdicts =====

    /// Settle a report under review.
    ///
    /// Settles on the ledger, then moves session and report to the outcome
    /// and applies the reporter's reputation delta in one write. A reward is
    /// only allowed with `Verified`.
    pub async fn adjudicate(
        &self,
        id: &SessionId,
        outcome: Outcome,
        reward: Option<u64>,
    ) -> Result<Session> {
        let (session, _) = self.settle(id, outcome, reward, false).await?;
        Ok(session)
    }

    /// Settle the session's report, scoring the jury when `score_jury` is set.
    ///
    /// Each attempt reads the session, report and ballots, checks that every
    /// identity to adjust has a record, settles on the ledger, then commits
    /// the verdict with all reputation changes. An attempt that loses a race
    /// to a ballot or a report update starts over from fresh reads.
    async fn settle(
        &self,
        id: &SessionId,
        outcome: Outcome,
        reward: Option<u64>,
        score_jury: bool,
    ) -> Result<(Session, VerdictSummary)> {
        for attempt in 1..=VERDICT_ATTEMPTS {
            let session = self
                .store
                .get_session(id)?
                .ok_or_else(|| LifecycleError::SessionNotFound(id.clone()))?;
            session.check_adjudicable(outcome, reward)?;
            let report = self.report(&session.report_id())?;

            let delta = match outcome {
                Outcome::Verified => self.config.reputation.verified_delta,
                Outcome::Rejected => self.config.reputation.rejected_delta,
            };
            let mut adjustments = vec![Adjustment::reporter(
                session.owner.clone(),
                delta,
                format!("report {} {}", report.id, outcome),
            )];
            let ballots = self.store.votes_for(&report.id)?;
            let summary =
                VerdictSummary::compute(report.id, &ballots, outcome.as_vote(), &self.config.jury);
            if score_jury {
                adjustments.extend(summary.adjustments.iter().cloned());
            }
            if let Some(missing) = self
                .reputation
                .find_missing(adjustments.iter().map(|a| &a.identity))?
            {
                return Err(ReputationError::IdentityNotFound(missing.short()).into());
            }

            let settlement_tx = self
                .ledger
                .settle(&report.ledger_report_ref, outcome, reward)
                .await?;
            let next_session = session.adjudicated(outcome, reward, settlement_tx.clone())?;
            let next_report = report.settled(outcome);

            let committed = self.reputation.apply_batch_with(&adjustments, |records| {
                self.store
                    .commit_verdict(&session, &next_session, &report, &next_report, records)
                    .map_err(CoreError::from)
            });
            match committed {
                Ok(_) => {
                    info!(
                        session = %id,
                        report = %report.id,
                        outcome = %outcome,
                        reward = ?reward,
                        adjustments = adjustments.len(),
                        tx = %settlement_tx,
                        "Report adjudicated"
                    );
                    return Ok((next_session, summary));
                }
                Err(CoreError::Store(StoreError::Conflict(reason))) => {
                    debug!(
                        session = %id,
                        attempt,
                        reason = %reason,
                        "Verdict lost a race, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Conflict(format!("session {id} kept changing")).into())
    }

    // ===== Jury =====

    /// Cast a ballot. The weight is taken from the voter's current jury
    /// reputation and frozen on the ballot.
    pub fn cast_vote(
        &self,
        report: &ReportId,
        voter: &IdentityRef,
        vote: Vote,
    ) -> Result<JuryVote> {
        let weight = match self.reputation.vote_weight(voter) {
            Ok(weight) => weight,
            Err(ReputationError::IdentityNotFound(_)) => {
                return Err(VotingError::UnknownJuror(voter.short()).into())
            }
            Err(e) => return Err(e.into()),
        };

        let ballot = JuryVote::cast(*report, voter.clone(), vote, VoteWeight::new(weight));
        match self.store.insert_vote(&ballot) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(VotingError::DuplicateVote {
                    report: report.to_hex(),
                    voter: voter.short(),
                }
                .into())
            }
            Err(StoreError::Precondition(_)) => {
                return Err(VotingError::ReportNotVotable(report.to_hex()).into())
            }
            Err(StoreError::NotFound(_)) => {
                return Err(VotingError::ReportNotFound(report.to_hex()).into())
            }
            Err(e) => return Err(e.into()),
        }

        debug!(report = %report, voter = %voter.short(), vote = %vote, weight, "Vote cast");
        Ok(ballot)
    }

    /// Weighted tally of the ballots on a report.
    pub fn tally(&self, report: &ReportId) -> Result<Tally> {
        self.report(report)?;
        let ballots = self.store.votes_for(report)?;
        Ok(Tally::from_ballots(&ballots))
    }

    /// Close a disputed report with the final outcome and score the jury.
    ///
    /// The verdict (no reward), the reporter's delta and every juror's
    /// adjustment commit together, and the commit fails if a ballot landed
    /// after the ballots were read, so the ballots scored are exactly the
    /// ballots counted. If any juror has no reputation record nothing is
    /// settled. A second finalize fails with `InvalidTransition` and applies
    /// nothing.
    pub async fn finalize_verdict(
        &self,
        report: &ReportId,
        outcome: Outcome,
    ) -> Result<VerdictSummary> {
        let session_id = self.report(report)?.session_id;
        let (_, summary) = self.settle(&session_id, outcome, None, true).await?;

        if summary.majority_matches_verdict {
            info!(
                report = %report,
                majority = %summary.majority,
                jurors = summary.tally.voter_count,
                "Verdict finalized"
            );
        } else {
            warn!(
                report = %report,
                majority = %summary.majority,
                verdict = %summary.verdict,
                jurors = summary.tally.voter_count,
                "Verdict finalized against the jury majority"
            );
        }
        Ok(summary)
    }
}

/// Evidence file names, passed to the annotator as context.
fn evidence_context(evidence: &[EvidenceRef]) -> Option<String> {
    if evidence.is_empty() {
        return None;
    }
    Some(
        evidence
            .iter()
            .map(|e| e.meta.file_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn open_reputation(store: &Arc<dyn RecordStore>) -> Result<Arc<ReputationLedger>> {
    let ledger = ReputationLedger::open(Arc::new(StoredReputation::new(Arc::clone(store))))?;
    Ok(Arc::new(ledger))
}
