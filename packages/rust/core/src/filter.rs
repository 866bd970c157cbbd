//! Final keyword filter: score threshold, word count, target size.

use openkeywords_shared::ScoredKeyword;

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub keywords: Vec<ScoredKeyword>,
    pub low_score_removed: usize,
    /// Removed for having too few words (checked after the score).
    pub short_removed: usize,
    /// Survivors dropped to honor the target count.
    pub truncated: usize,
}

/// Keep keywords with `score >= min_score` and at least `min_word_count`
/// words, then cut to the first `target_count`. Order is preserved.
pub fn filter_keywords(
    keywords: Vec<ScoredKeyword>,
    min_score: u8,
    min_word_count: usize,
    target_count: usize,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    for keyword in keywords {
        if keyword.score < min_score {
            outcome.low_score_removed += 1;
        } else if keyword.candidate.word_count() < min_word_count {
            outcome.short_removed += 1;
        } else {
            outcome.keywords.push(keyword);
        }
    }
    if outcome.keywords.len() > target_count {
        outcome.truncated = outcome.keywords.len() - target_count;
        outcome.keywords.truncate(target_count);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use openkeywords_shared::{CandidateKeyword, Intent, KeywordSource};

    fn scored(text: &str, score: u8) -> ScoredKeyword {
        ScoredKeyword::new(
            CandidateKeyword::new(text, Intent::Informational, KeywordSource::AiGenerated),
            score,
        )
    }

    #[test]
    fn applies_both_thresholds() {
        let out = filter_keywords(
            vec![
                scored("crm pricing", 80),
                scored("crm", 95),
                scored("random words here", 12),
                scored("crm for dentists", 40),
            ],
            40,
            2,
            50,
        );
        let texts: Vec<_> = out.keywords.iter().map(|k| k.keyword()).collect();
        assert_eq!(texts, vec!["crm pricing", "crm for dentists"]);
        assert_eq!(out.low_score_removed, 1);
        assert_eq!(out.short_removed, 1);
        assert_eq!(out.truncated, 0);
        assert!(out.keywords.iter().all(|k| k.score >= 40 && k.candidate.word_count() >= 2));
    }

    #[test]
    fn truncates_to_target_in_order() {
        let input = (0..10).map(|i| scored(&format!("keyword number {i}"), 60)).collect();
        let out = filter_keywords(input, 40, 2, 3);
        let texts: Vec<_> = out.keywords.iter().map(|k| k.keyword()).collect();
        assert_eq!(texts, vec!["keyword number 0", "keyword number 1", "keyword number 2"]);
        assert_eq!(out.truncated, 7);
    }
}
