//! Advisory annotations.
//!
//! An annotation is a hint for the reviewer: a category, an urgency, a
//! credibility guess and a suggested next step. It never feeds the verdict,
//! the tally or any reputation score, and a failing annotator degrades to no
//! annotation.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tipline_crypto::Hash256;
use tracing::{debug, warn};

use crate::external::{ExternalError, ExternalResult};

/// How quickly a report needs attention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Urgency {
    /// Routine.
    Low,
    /// Within days.
    Medium,
    /// Within hours.
    High,
    /// Someone may be in danger.
    Critical,
}

/// Advisory signals attached to an opened report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Topic of the report.
    pub category: String,
    /// Urgency.
    pub urgency: Urgency,
    /// Rough credibility, `0..=100`.
    pub credibility: u8,
    /// Suggested next step for the reviewer.
    pub suggested_action: String,
}

/// Source of advisory annotations.
#[async_trait]
pub trait AdvisoryAnnotator: Send + Sync {
    /// Analyze decrypted report text.
    async fn analyze(&self, plaintext: &[u8], context: Option<&str>) -> ExternalResult<Annotation>;
}

/// Run an annotator, logging and discarding any failure.
pub async fn annotate_advisory(
    annotator: &dyn AdvisoryAnnotator,
    plaintext: &[u8],
    context: Option<&str>,
) -> Option<Annotation> {
    match annotator.analyze(plaintext, context).await {
        Ok(annotation) => Some(annotation),
        Err(e) => {
            warn!(error = %e, "Advisory annotation unavailable");
            None
        }
    }
}

/// Keyword table: category and the terms that select it.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("fraud", &["invoice", "embezzle", "kickback", "bribe", "launder", "payroll", "fraud"]),
    ("safety", &["injury", "unsafe", "toxic", "leak", "hazard", "collapse", "fire"]),
    ("harassment", &["harass", "threaten", "abuse", "intimidat", "stalk"]),
    ("corruption", &["official", "contract", "tender", "favor", "nepotism", "corrupt"]),
    ("environment", &["dump", "spill", "pollut", "emission", "waste"]),
];

/// Terms that raise urgency to critical.
const CRITICAL_TERMS: &[&str] = &["danger", "weapon", "imminent", "life-threatening", "tonight"];

/// Terms that raise urgency to high.
const HIGH_TERMS: &[&str] = &["urgent", "immediately", "asap", "today", "threat"];

/// Offline heuristic annotator.
///
/// Picks the category with the most keyword hits, reads urgency from a
/// short list of terms, and scores credibility from concrete detail (digits,
/// length, attached context).
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnnotator;

impl KeywordAnnotator {
    /// New annotator.
    pub fn new() -> Self {
        Self
    }

    fn annotate(text: &str, context: Option<&str>) -> Annotation {
        let lower = text.to_lowercase();

        let category = CATEGORIES
            .iter()
            .map(|(name, terms)| (*name, terms.iter().filter(|t| lower.contains(**t)).count()))
            .filter(|(_, hits)| *hits > 0)
            .max_by_key(|(_, hits)| *hits)
            .map_or("general", |(name, _)| name)
            .to_string();

        let urgency = if CRITICAL_TERMS.iter().any(|t| lower.contains(*t)) {
            Urgency::Critical
        } else if HIGH_TERMS.iter().any(|t| lower.contains(*t)) {
            Urgency::High
        } else if category != "general" {
            Urgency::Medium
        } else {
            Urgency::Low
        };

        let digits = text.chars().filter(char::is_ascii_digit).count();
        let words = text.split_whitespace().count();
        let mut credibility: u32 = 30;
        credibility += (digits.min(20) as u32) * 2;
        credibility += (words.min(200) as u32) / 10;
        if context.is_some_and(|c| !c.trim().is_empty()) {
            credibility += 10;
        }
        let credibility = credibility.min(100) as u8;

        let suggested_action = match urgency {
            Urgency::Critical => "escalate to the authority immediately",
            Urgency::High => "review within the day",
            Urgency::Medium if credibility >= 60 => "open an investigation",
            Urgency::Medium => "request corroborating evidence",
            Urgency::Low => "queue for routine review",
        }
        .to_string();

        Annotation {
            category,
            urgency,
            credibility,
            suggested_action,
        }
    }
}

#[async_trait]
impl AdvisoryAnnotator for KeywordAnnotator {
    async fn analyze(&self, plaintext: &[u8], context: Option<&str>) -> ExternalResult<Annotation> {
        let text = std::str::from_utf8(plaintext)
            .map_err(|e| ExternalError::Annotator(format!("report is not UTF-8: {e}")))?;
        Ok(Self::annotate(text, context))
    }
}

/// Caller-owned LRU cache in front of another annotator.
///
/// Entries are keyed by the BLAKE3 hash of the text and context, so the
/// plaintext itself is not kept as a key. Capacity is the only eviction
/// policy. Failures are not cached.
pub struct CachedAnnotator<A> {
    inner: A,
    cache: Mutex<LruCache<Hash256, Annotation>>,
}

impl<A: AdvisoryAnnotator> CachedAnnotator<A> {
    /// Wrap `inner` with room for `capacity` entries (at least one).
    pub fn new(inner: A, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(plaintext: &[u8], context: Option<&str>) -> Hash256 {
        Hash256::hash_many(&[plaintext, context.unwrap_or_default().as_bytes()])
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// True when the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

impl<A> std::fmt::Debug for CachedAnnotator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.cache.lock().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("CachedAnnotator").field("entries", &len).finish()
    }
}

#[async_trait]
impl<A: AdvisoryAnnotator> AdvisoryAnnotator for CachedAnnotator<A> {
    async fn analyze(&self, plaintext: &[u8], context: Option<&str>) -> ExternalResult<Annotation> {
        let key = Self::key(plaintext, context);
        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|e| ExternalError::Annotator(e.to_string()))?;
            if let Some(hit) = cache.get(&key) {
                debug!("Annotation cache hit");
                return Ok(hit.clone());
            }
        }

        let annotation = self.inner.analyze(plaintext, context).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, annotation.clone());
        }
        Ok(annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingAnnotator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AdvisoryAnnotator for CountingAnnotator {
        async fn analyze(
            &self,
            plaintext: &[u8],
            context: Option<&str>,
        ) -> ExternalResult<Annotation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            KeywordAnnotator.analyze(plaintext, context).await
        }
    }

    struct BrokenAnnotator;

    #[async_trait]
    impl AdvisoryAnnotator for BrokenAnnotator {
        async fn analyze(&self, _: &[u8], _: Option<&str>) -> ExternalResult<Annotation> {
            Err(ExternalError::Annotator("service down".into()))
        }
    }

    #[tokio::test]
    async fn test_keyword_categories() {
        let annotation = KeywordAnnotator
            .analyze(b"The payroll invoice was used to embezzle 40000 over 3 months", None)
            .await
            .unwrap();
        assert_eq!(annotation.category, "fraud");
        assert_eq!(annotation.urgency, Urgency::Medium);

        let annotation = KeywordAnnotator
            .analyze(b"There is a weapon on site, this is a danger to staff", None)
            .await
            .unwrap();
        assert_eq!(annotation.urgency, Urgency::Critical);
        assert_eq!(annotation.suggested_action, "escalate to the authority immediately");

        let annotation = KeywordAnnotator.analyze(b"hello", None).await.unwrap();
        assert_eq!(annotation.category, "general");
        assert_eq!(annotation.urgency, Urgency::Low);
    }

    #[tokio::test]
    async fn test_credibility_rewards_detail() {
        let vague = KeywordAnnotator.analyze(b"something bad happened", None).await.unwrap();
        let detailed = KeywordAnnotator
            .analyze(
                b"On 2024-03-14 at 09:30 invoice 88231 was paid twice to vendor 4471",
                Some("finance department"),
            )
            .await
            .unwrap();
        assert!(detailed.credibility > vague.credibility);
        assert!(detailed.credibility <= 100);
    }

    #[tokio::test]
    async fn test_non_utf8_fails() {
        assert!(KeywordAnnotator.analyze(&[0xff, 0xfe], None).await.is_err());
    }

    #[tokio::test]
    async fn test_cache_hits_and_evicts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = CachedAnnotator::new(
            CountingAnnotator {
                calls: Arc::clone(&calls),
            },
            2,
        );

        cached.analyze(b"one", None).await.unwrap();
        cached.analyze(b"one", None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Context is part of the key.
        cached.analyze(b"one", Some("ctx")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cached.analyze(b"two", None).await.unwrap();
        assert_eq!(cached.len(), 2);
        cached.analyze(b"one", None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        cached.clear();
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn test_failure_degrades_to_none() {
        assert!(annotate_advisory(&BrokenAnnotator, b"text", None).await.is_none());
        assert!(annotate_advisory(&KeywordAnnotator, b"text", None).await.is_some());
    }
}
