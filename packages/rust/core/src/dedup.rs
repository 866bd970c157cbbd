//! Exact and word-order duplicate removal.
//!
//! Two linear passes over the candidates, first occurrence wins:
//!
//! 1. **Exact**: trimmed, lowercased text.
//! 2. **Token signature**: lowercase words sorted and rejoined, so
//!    "seo tool" and "tool seo" collapse.
//!
//! Permutations that differ in meaning ("dog bites man") collapse too.
//! That approximation is accepted here; scoring and clustering judge meaning.

use std::collections::HashSet;

use tracing::{debug, instrument};

use openkeywords_shared::CandidateKeyword;

/// Outcome of one deduplication pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    pub keywords: Vec<CandidateKeyword>,
    pub exact_removed: usize,
    pub near_removed: usize,
    /// Blank keywords dropped before comparison.
    pub empty_removed: usize,
}

impl DedupOutcome {
    /// Duplicates removed by both passes.
    pub fn duplicates_removed(&self) -> usize {
        self.exact_removed + self.near_removed
    }
}

/// Normalized form used by the exact pass.
pub fn normalize(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

/// Sort-independent form used by the near-duplicate pass.
pub fn token_signature(keyword: &str) -> String {
    let lower = keyword.to_lowercase();
    let mut tokens: Vec<&str> = lower.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Remove exact and near-duplicate candidates, preserving input order.
#[instrument(skip_all, fields(input = candidates.len()))]
pub fn deduplicate(candidates: Vec<CandidateKeyword>) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();
    let mut seen_exact = HashSet::with_capacity(candidates.len());
    let mut seen_signature = HashSet::with_capacity(candidates.len());

    for candidate in candidates {
        let normalized = normalize(&candidate.keyword);
        if normalized.is_empty() {
            outcome.empty_removed += 1;
            continue;
        }
        if !seen_exact.insert(normalized) {
            outcome.exact_removed += 1;
            continue;
        }
        if !seen_signature.insert(token_signature(&candidate.keyword)) {
            outcome.near_removed += 1;
            continue;
        }
        outcome.keywords.push(candidate);
    }

    debug!(
        kept = outcome.keywords.len(),
        exact = outcome.exact_removed,
        near = outcome.near_removed,
        empty = outcome.empty_removed,
        "deduplication complete"
    );

    outcome
}
