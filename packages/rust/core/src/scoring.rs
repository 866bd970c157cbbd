//! Company-fit scoring through the AI Capability.
//!
//! Keywords are scored in fixed-size batches, several in flight at once.
//! Each response is joined back to its batch by normalized text:
//!
//! - duplicate response keys: the first entry wins
//! - keys not in the batch: ignored, counted as unmatched
//! - scores outside 0..=100: treated as missing
//! - missing keywords: score 0, batch flagged degraded
//!
//! A failed or malformed batch degrades to all-zero scores without touching
//! other batches.

use std::collections::{HashMap, HashSet};

use futures_util::{StreamExt, stream};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use openkeywords_shared::{
    AiError, AiRequest, AiTask, CandidateKeyword, CompanyContext, ScoredKeyword,
};

use crate::ai::AiSession;
use crate::dedup::normalize;
use crate::prompts;

/// Keywords per scoring call.
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct ScoringResponse {
    scores: Vec<ScoreEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScoreEntry {
    keyword: String,
    score: f64,
}

/// Scores for every input keyword, in input order.
#[derive(Debug, Clone, Default)]
pub struct ScoringOutcome {
    pub keywords: Vec<ScoredKeyword>,
    pub batches: usize,
    /// 0-based indices of batches with a failed call or missing keywords.
    pub degraded_batches: Vec<usize>,
    /// Keywords that received the default score 0.
    pub missing: usize,
    /// Response entries that matched no keyword in their batch.
    pub unmatched: usize,
}

impl ScoringOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_batches.is_empty()
    }
}

#[derive(Debug, Default)]
struct JoinStats {
    missing: usize,
    unmatched: usize,
}

struct BatchResult {
    index: usize,
    keywords: Vec<ScoredKeyword>,
    stats: JoinStats,
    error: Option<AiError>,
}

/// Assigns each keyword a 0–100 company-fit score.
pub struct RelevanceScorer<'a> {
    ai: &'a AiSession,
    batch_size: usize,
    concurrency: usize,
}

impl<'a> RelevanceScorer<'a> {
    pub fn new(ai: &'a AiSession, batch_size: usize, concurrency: usize) -> Self {
        Self {
            ai,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Score every candidate. Never fails; failures surface as degraded
    /// batches in the outcome.
    #[instrument(skip_all, fields(keywords = candidates.len(), batch_size = self.batch_size))]
    pub async fn score(
        &self,
        ctx: &CompanyContext,
        candidates: Vec<CandidateKeyword>,
    ) -> ScoringOutcome {
        let mut batches: Vec<Vec<CandidateKeyword>> = Vec::new();
        let mut iter = candidates.into_iter().peekable();
        while iter.peek().is_some() {
            batches.push(iter.by_ref().take(self.batch_size).collect());
        }

        let batch_count = batches.len();
        let results: Vec<BatchResult> = stream::iter(
            batches
                .into_iter()
                .enumerate()
                .map(|(index, batch)| self.score_batch(ctx, index, batch_count, batch)),
        )
        .buffered(self.concurrency)
        .collect()
        .await;

        let mut outcome = ScoringOutcome {
            batches: batch_count,
            ..Default::default()
        };
        for result in results {
            if result.error.is_some() || result.stats.missing > 0 {
                outcome.degraded_batches.push(result.index);
            }
            outcome.missing += result.stats.missing;
            outcome.unmatched += result.stats.unmatched;
            outcome.keywords.extend(result.keywords);
        }

        info!(
            scored = outcome.keywords.len(),
            batches = outcome.batches,
            degraded = outcome.degraded_batches.len(),
            missing = outcome.missing,
            "scoring complete"
        );
        outcome
    }

    async fn score_batch(
        &self,
        ctx: &CompanyContext,
        index: usize,
        total: usize,
        batch: Vec<CandidateKeyword>,
    ) -> BatchResult {
        let texts: Vec<&str> = batch.iter().map(|k| k.keyword.as_str()).collect();
        let request = AiRequest::new(AiTask::Scoring, prompts::scoring(ctx, &texts))
            .with_schema(prompts::scoring_schema())
            .with_temperature(0.2);

        match self.ai.call_typed::<ScoringResponse>(request).await {
            Ok(response) => {
                let (keywords, stats) = join_scores(batch, response.scores);
                debug!(
                    batch = index + 1,
                    total,
                    missing = stats.missing,
                    unmatched = stats.unmatched,
                    "batch scored"
                );
                BatchResult {
                    index,
                    keywords,
                    stats,
                    error: None,
                }
            }
            Err(error) => {
                warn!(batch = index + 1, total, %error, "scoring batch failed, defaulting to 0");
                let missing = batch.len();
                BatchResult {
                    index,
                    keywords: batch.into_iter().map(|c| ScoredKeyword::new(c, 0)).collect(),
                    stats: JoinStats {
                        missing,
                        unmatched: 0,
                    },
                    error: Some(error),
                }
            }
        }
    }
}

/// Keyed join of a batch with its score entries.
fn join_scores(
    batch: Vec<CandidateKeyword>,
    entries: Vec<ScoreEntry>,
) -> (Vec<ScoredKeyword>, JoinStats) {
    let keys: HashSet<String> = batch.iter().map(|k| normalize(&k.keyword)).collect();
    let mut stats = JoinStats::default();
    let mut scores: HashMap<String, Option<u8>> = HashMap::with_capacity(entries.len());

    for entry in entries {
        let key = normalize(&entry.keyword);
        if !keys.contains(&key) {
            stats.unmatched += 1;
            continue;
        }
        let score = (entry.score.is_finite() && (0.0..=100.0).contains(&entry.score))
            .then(|| entry.score.round() as u8);
        scores.entry(key).or_insert(score);
    }

    let scored = batch
        .into_iter()
        .map(|candidate| {
            let score = scores.get(&normalize(&candidate.keyword)).copied().flatten();
            match score {
                Some(score) => ScoredKeyword::new(candidate, score),
                None => {
                    stats.missing += 1;
                    ScoredKeyword::new(candidate, 0)
                }
            }
        })
        .collect();

    (scored, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::RetryPolicy;
    use crate::testing::{ScriptedAi, prompt_keywords};
    use openkeywords_shared::{Intent, KeywordSource};
    use serde_json::json;

    fn kw(text: &str) -> CandidateKeyword {
        CandidateKeyword::new(text, Intent::Informational, KeywordSource::AiGenerated)
    }

    fn entry(text: &str, score: f64) -> ScoreEntry {
        ScoreEntry {
            keyword: text.into(),
            score,
        }
    }

    fn ctx() -> CompanyContext {
        CompanyContext {
            name: "Acme".into(),
            industry: "B2B SaaS".into(),
            ..Default::default()
        }
    }

    #[test]
    fn join_matches_case_insensitively() {
        let (scored, stats) = join_scores(
            vec![kw("CRM Pricing"), kw("sales pipeline")],
            vec![entry("sales pipeline", 70.0), entry("crm pricing ", 85.0)],
        );
        assert_eq!(scored[0].score, 85);
        assert_eq!(scored[1].score, 70);
        assert_eq!(stats.missing, 0);
    }

    #[test]
    fn join_first_duplicate_wins() {
        let (scored, _) = join_scores(
            vec![kw("crm pricing")],
            vec![entry("crm pricing", 90.0), entry("CRM pricing", 10.0)],
        );
        assert_eq!(scored[0].score, 90);
    }

    #[test]
    fn join_counts_unmatched_and_missing() {
        let (scored, stats) = join_scores(
            vec![kw("a b"), kw("c d")],
            vec![entry("a b", 50.0), entry("x y", 99.0)],
        );
        assert_eq!(scored[1].score, 0);
        assert_eq!(stats.missing, 1);
        assert_eq!(stats.unmatched, 1);
    }

    #[test]
    fn join_rejects_out_of_range_scores() {
        let (scored, stats) = join_scores(
            vec![kw("a b"), kw("c d")],
            vec![entry("a b", 140.0), entry("c d", -3.0)],
        );
        assert!(scored.iter().all(|k| k.score == 0));
        assert_eq!(stats.missing, 2);
    }

    #[tokio::test]
    async fn batches_by_size_and_keeps_input_order() {
        let ai = ScriptedAi::new();
        // respond in reverse order to prove the join is positional-free
        ai.respond(AiTask::Scoring, |req| {
            let scores: Vec<_> = prompt_keywords(req)
                .iter()
                .rev()
                .map(|k| json!({"keyword": k, "score": 60}))
                .collect();
            Ok(json!({ "scores": scores }))
        });
        let session = AiSession::new(ai.clone(), RetryPolicy::none());
        let scorer = RelevanceScorer::new(&session, 2, 4);

        let input: Vec<_> = ["k one", "k two", "k three", "k four", "k five"]
            .into_iter()
            .map(kw)
            .collect();
        let outcome = scorer.score(&ctx(), input).await;

        let texts: Vec<_> = outcome.keywords.iter().map(|k| k.keyword()).collect();
        assert_eq!(texts, vec!["k one", "k two", "k three", "k four", "k five"]);
        assert!(outcome.keywords.iter().all(|k| k.score == 60));
        assert_eq!(outcome.batches, 3);
        assert_eq!(ai.calls(AiTask::Scoring), 3);
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn failed_batch_defaults_to_zero_without_touching_others() {
        let ai = ScriptedAi::new();
        ai.respond(AiTask::Scoring, |req| {
            let keywords = prompt_keywords(req);
            if keywords.iter().any(|k| k == "k three") {
                return Err(AiError::InvalidResponse("truncated".into()));
            }
            let scores: Vec<_> = keywords
                .iter()
                .map(|k| json!({"keyword": k, "score": 75}))
                .collect();
            Ok(json!({ "scores": scores }))
        });
        let session = AiSession::new(ai.clone(), RetryPolicy::none());
        let scorer = RelevanceScorer::new(&session, 2, 2);

        let input: Vec<_> = ["k one", "k two", "k three", "k four", "k five", "k six"]
            .into_iter()
            .map(kw)
            .collect();
        let outcome = scorer.score(&ctx(), input).await;

        let scores: Vec<_> = outcome.keywords.iter().map(|k| k.score).collect();
        assert_eq!(scores, vec![75, 75, 0, 0, 75, 75]);
        assert_eq!(outcome.degraded_batches, vec![1]);
        assert_eq!(outcome.missing, 2);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let ai = ScriptedAi::new();
        let session = AiSession::new(ai.clone(), RetryPolicy::none());
        let outcome = RelevanceScorer::new(&session, 50, 4)
            .score(&ctx(), Vec::new())
            .await;
        assert!(outcome.keywords.is_empty());
        assert_eq!(ai.total_calls(), 0);
    }
}
