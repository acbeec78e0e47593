//! Narrow contracts for external collaborators.
//!
//! The content store and ledger are outside the trust model: the desk only
//! knows that addresses are stable and that the ledger returns references.
//! Failures are surfaced as [`ExternalError`] and never retried here; the
//! hash of the content address is the idempotency key callers retry with.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tipline_crypto::Hash256;
use tipline_reputation::IdentityRef;

use crate::report::Outcome;
use crate::session::SubmissionReceipt;

/// Errors from external collaborators. Retryable by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalError {
    /// Content store failed.
    #[error("Content store error: {0}")]
    ContentStore(String),

    /// Ledger failed.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Annotator failed.
    #[error("Annotator error: {0}")]
    Annotator(String),

    /// Referenced object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request contradicts state the collaborator already holds.
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result type for external calls.
pub type ExternalResult<T> = std::result::Result<T, ExternalError>;

/// Content-addressed blob store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their address. Same bytes, same address.
    async fn put(&self, bytes: &[u8]) -> ExternalResult<String>;

    /// Fetch the exact bytes stored at `address`.
    async fn get(&self, address: &str) -> ExternalResult<Vec<u8>>;
}

/// Settlement ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Record a submission. Calls with the same `address_hash` return the
    /// same receipt.
    async fn record_submission(
        &self,
        address_hash: &Hash256,
        session_hash: &Hash256,
        owner: &IdentityRef,
    ) -> ExternalResult<SubmissionReceipt>;

    /// Settle a report and return the settlement transaction.
    ///
    /// Repeating the same settlement returns the same transaction. Settling
    /// an already settled report with a different outcome or reward fails
    /// with [`ExternalError::Conflict`].
    async fn settle(
        &self,
        report_ref: &str,
        outcome: Outcome,
        reward: Option<u64>,
    ) -> ExternalResult<String>;

    /// Ledger-side reputation for an owner.
    async fn reputation(&self, owner: &IdentityRef) -> ExternalResult<u64>;

    /// Rewards paid to an owner.
    async fn rewards(&self, owner: &IdentityRef) -> ExternalResult<u64>;
}

fn guard<'a, T>(
    lock: &'a Mutex<T>,
    map: fn(String) -> ExternalError,
) -> ExternalResult<MutexGuard<'a, T>> {
    lock.lock().map_err(|e| map(e.to_string()))
}

/// In-memory content store with `b3:<hex>` addresses.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicUsize,
}

impl MemoryContentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of `bytes`.
    pub fn address_of(bytes: &[u8]) -> String {
        format!("b3:{}", Hash256::hash(bytes).to_hex())
    }

    /// Make the next `count` puts fail.
    pub fn fail_next_puts(&self, count: usize) {
        self.fail_puts.store(count, Ordering::SeqCst);
    }

    /// Number of distinct blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: &[u8]) -> ExternalResult<String> {
        if take_failure(&self.fail_puts) {
            return Err(ExternalError::ContentStore("injected put failure".into()));
        }
        let address = Self::address_of(bytes);
        let mut blobs = guard(&self.blobs, ExternalError::ContentStore)?;
        blobs.entry(address.clone()).or_insert_with(|| bytes.to_vec());
        Ok(address)
    }

    async fn get(&self, address: &str) -> ExternalResult<Vec<u8>> {
        let blobs = guard(&self.blobs, ExternalError::ContentStore)?;
        blobs
            .get(address)
            .cloned()
            .ok_or_else(|| ExternalError::NotFound(address.to_string()))
    }
}

/// Settlement recorded by [`MemoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Outcome settled.
    pub outcome: Outcome,
    /// Reward paid.
    pub reward: Option<u64>,
    /// Settlement transaction.
    pub tx_ref: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    receipts: HashMap<Hash256, SubmissionReceipt>,
    owners: HashMap<String, IdentityRef>,
    settlements: HashMap<String, Settlement>,
    next_report: u64,
}

/// In-memory ledger with deterministic references.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    fail_submissions: AtomicUsize,
    fail_settlements: AtomicUsize,
}

impl MemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` submissions fail.
    pub fn fail_next_submissions(&self, count: usize) {
        self.fail_submissions.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` settlements fail.
    pub fn fail_next_settlements(&self, count: usize) {
        self.fail_settlements.store(count, Ordering::SeqCst);
    }

    /// Number of distinct submissions recorded.
    pub fn submission_count(&self) -> usize {
        self.state.lock().map(|s| s.receipts.len()).unwrap_or(0)
    }

    /// Settlement recorded for a report handle.
    pub fn settlement(&self, report_ref: &str) -> Option<Settlement> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.settlements.get(report_ref).cloned())
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn record_submission(
        &self,
        address_hash: &Hash256,
        session_hash: &Hash256,
        owner: &IdentityRef,
    ) -> ExternalResult<SubmissionReceipt> {
        if take_failure(&self.fail_submissions) {
            return Err(ExternalError::Ledger("injected submission failure".into()));
        }
        let mut state = guard(&self.state, ExternalError::Ledger)?;
        if let Some(receipt) = state.receipts.get(address_hash) {
            return Ok(receipt.clone());
        }

        state.next_report += 1;
        let tx = Hash256::hash_many(&[
            b"submit".as_slice(),
            &address_hash.as_bytes()[..],
            &session_hash.as_bytes()[..],
        ]);
        let receipt = SubmissionReceipt {
            tx_ref: format!("tx:{}", &tx.to_hex()[..16]),
            report_ref: format!("rpt:{}", state.next_report),
        };
        state.owners.insert(receipt.report_ref.clone(), owner.clone());
        state.receipts.insert(address_hash.clone(), receipt.clone());
        Ok(receipt)
    }

    async fn settle(
        &self,
        report_ref: &str,
        outcome: Outcome,
        reward: Option<u64>,
    ) -> ExternalResult<String> {
        if take_failure(&self.fail_settlements) {
            return Err(ExternalError::Ledger("injected settlement failure".into()));
        }
        let mut state = guard(&self.state, ExternalError::Ledger)?;
        if !state.owners.contains_key(report_ref) {
            return Err(ExternalError::NotFound(report_ref.to_string()));
        }
        if let Some(existing) = state.settlements.get(report_ref) {
            if existing.outcome != outcome || existing.reward != reward {
                return Err(ExternalError::Conflict(format!(
                    "{report_ref} already settled as {} with reward {:?}",
                    existing.outcome, existing.reward
                )));
            }
            return Ok(existing.tx_ref.clone());
        }

        let outcome_tag = outcome.to_string();
        let tx = Hash256::hash_many(&[
            b"settle".as_slice(),
            report_ref.as_bytes(),
            outcome_tag.as_bytes(),
        ]);
        let settlement = Settlement {
            outcome,
            reward,
            tx_ref: format!("tx:{}", &tx.to_hex()[..16]),
        };
        let tx_ref = settlement.tx_ref.clone();
        state.settlements.insert(report_ref.to_string(), settlement);
        Ok(tx_ref)
    }

    async fn reputation(&self, owner: &IdentityRef) -> ExternalResult<u64> {
        let state = guard(&self.state, ExternalError::Ledger)?;
        let verified = state
            .settlements
            .iter()
            .filter(|(report_ref, s)| {
                s.outcome == Outcome::Verified && state.owners.get(*report_ref) == Some(owner)
            })
            .count();
        Ok(verified as u64)
    }

    async fn rewards(&self, owner: &IdentityRef) -> ExternalResult<u64> {
        let state = guard(&self.state, ExternalError::Ledger)?;
        Ok(state
            .settlements
            .iter()
            .filter(|(report_ref, _)| state.owners.get(*report_ref) == Some(owner))
            .filter_map(|(_, s)| s.reward)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_content_store_is_content_addressed() {
        let store = MemoryContentStore::new();
        let a = store.put(b"sealed").await.unwrap();
        let b = store.put(b"sealed").await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("b3:"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&a).await.unwrap(), b"sealed");
        assert!(matches!(
            store.get("b3:missing").await,
            Err(ExternalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_put_failure() {
        let store = MemoryContentStore::new();
        store.fail_next_puts(1);
        assert!(store.put(b"x").await.is_err());
        assert!(store.put(b"x").await.is_ok());
    }

    #[tokio::test]
    async fn test_ledger_submission_is_idempotent() {
        let ledger = MemoryLedger::new();
        let owner = IdentityRef::derive("tg:1");
        let address = Hash256::hash(b"b3:aa");
        let session = Hash256::hash(b"session");

        let first = ledger.record_submission(&address, &session, &owner).await.unwrap();
        let retry = ledger.record_submission(&address, &session, &owner).await.unwrap();
        assert_eq!(first, retry);
        assert_eq!(ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_ledger_settlement_and_rewards() {
        let ledger = MemoryLedger::new();
        let owner = IdentityRef::derive("tg:1");
        let receipt = ledger
            .record_submission(&Hash256::hash(b"a"), &Hash256::hash(b"s"), &owner)
            .await
            .unwrap();

        let tx = ledger
            .settle(&receipt.report_ref, Outcome::Verified, Some(250))
            .await
            .unwrap();
        assert_eq!(
            ledger.settle(&receipt.report_ref, Outcome::Verified, Some(250)).await.unwrap(),
            tx
        );
        assert_eq!(ledger.rewards(&owner).await.unwrap(), 250);
        assert_eq!(ledger.reputation(&owner).await.unwrap(), 1);
        assert_eq!(ledger.rewards(&IdentityRef::derive("tg:2")).await.unwrap(), 0);

        assert!(matches!(
            ledger.settle("rpt:999", Outcome::Rejected, None).await,
            Err(ExternalError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ledger_refuses_a_different_settlement() {
        let ledger = MemoryLedger::new();
        let owner = IdentityRef::derive("tg:1");
        let receipt = ledger
            .record_submission(&Hash256::hash(b"a"), &Hash256::hash(b"s"), &owner)
            .await
            .unwrap();
        ledger
            .settle(&receipt.report_ref, Outcome::Verified, Some(500))
            .await
            .unwrap();

        assert!(matches!(
            ledger.settle(&receipt.report_ref, Outcome::Rejected, None).await,
            Err(ExternalError::Conflict(_))
        ));
        assert!(matches!(
            ledger.settle(&receipt.report_ref, Outcome::Verified, Some(100)).await,
            Err(ExternalError::Conflict(_))
        ));
        let settlement = ledger.settlement(&receipt.report_ref).unwrap();
        assert_eq!(settlement.outcome, Outcome::Verified);
        assert_eq!(settlement.reward, Some(500));
        assert_eq!(ledger.rewards(&owner).await.unwrap(), 500);
    }
}
