//! End-to-end keyword pipeline:
//! research → generation → dedup → scoring → enrichment → filtering → clustering.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use openkeywords_shared::{
    AiCapability, AppConfig, CandidateKeyword, Cluster, ClusteredKeyword, CompanyContext, Intent,
    KeywordMetricsSource, KeywordSource, OpenKeywordsError, Result, Stage, StageOutcome,
    StageStatus,
};

use crate::ai::{AiSession, RetryPolicy};
use crate::clustering::{ClusteringOutcome, SemanticClusterer};
use crate::dedup;
use crate::enrichment;
use crate::filter;
use crate::generation;
use crate::research::{self, ResearchOutcome};
use crate::scoring::{DEFAULT_BATCH_SIZE, RelevanceScorer};

// ---------------------------------------------------------------------------
// Config / result types
// ---------------------------------------------------------------------------

/// Per-run pipeline settings. CLI flags override values taken from the
/// config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Keywords the run aims to return.
    pub target_count: usize,
    pub min_score: u8,
    pub min_word_count: usize,
    pub cluster_count: usize,
    pub enable_clustering: bool,
    pub enable_research: bool,
    pub enable_enrichment: bool,
    pub scoring_batch_size: usize,
    /// Scoring batches in flight at once.
    pub max_concurrent_calls: usize,
    #[serde(skip, default)]
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_count: 50,
            min_score: 40,
            min_word_count: 2,
            cluster_count: 6,
            enable_clustering: true,
            enable_research: false,
            enable_enrichment: false,
            scoring_batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_calls: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let d = &config.defaults;
        Self {
            target_count: d.target_count,
            min_score: d.min_score,
            min_word_count: d.min_word_count,
            cluster_count: d.cluster_count,
            scoring_batch_size: d.scoring_batch_size,
            max_concurrent_calls: d.max_concurrent_calls,
            retry: RetryPolicy::from(&config.retry),
            ..Self::default()
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.target_count == 0 {
            return Err(OpenKeywordsError::validation("target_count must be positive"));
        }
        if self.min_score > 100 {
            return Err(OpenKeywordsError::validation(format!(
                "min_score must be within 0..=100, got {}",
                self.min_score
            )));
        }
        Ok(())
    }
}

/// Summary counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatistics {
    /// Keywords returned.
    pub total: usize,
    pub duplicates_removed: usize,
    pub empty_removed: usize,
    pub low_score_removed: usize,
    pub short_removed: usize,
    pub truncated: usize,
    pub research_count: usize,
    pub generated_count: usize,
    /// Attempts sent to the AI Capability, retries included.
    pub ai_calls: usize,
    pub avg_score: f64,
    pub intent_breakdown: BTreeMap<Intent, usize>,
    pub source_breakdown: BTreeMap<KeywordSource, usize>,
    pub degraded_stages: Vec<Stage>,
    pub duration_ms: u64,
}

/// Final output of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Keywords in post-filter order.
    pub keywords: Vec<ClusteredKeyword>,
    pub clusters: Vec<Cluster>,
    pub statistics: PipelineStatistics,
    pub stages: Vec<StageOutcome>,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Observer for stage transitions. Also the cancellation channel: the
/// orchestrator polls [`is_cancelled`](Self::is_cancelled) between stages.
pub trait ProgressReporter: Send + Sync {
    fn stage_started(&self, stage: Stage);
    fn stage_finished(&self, outcome: &StageOutcome);
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _outcome: &StageOutcome) {}
}

/// Stage bookkeeping for one run.
struct StageLog<'a> {
    progress: &'a dyn ProgressReporter,
    outcomes: Vec<StageOutcome>,
}

impl<'a> StageLog<'a> {
    fn new(progress: &'a dyn ProgressReporter) -> Self {
        Self {
            progress,
            outcomes: Vec::new(),
        }
    }

    /// Refuse to start `stage` if the caller cancelled.
    fn start(&self, stage: Stage) -> Result<()> {
        if self.progress.is_cancelled() {
            warn!(%stage, "run cancelled before stage");
            return Err(OpenKeywordsError::Cancelled);
        }
        self.progress.stage_started(stage);
        Ok(())
    }

    fn finish(&mut self, outcome: StageOutcome) {
        if outcome.status == StageStatus::Degraded {
            warn!(
                stage = %outcome.stage,
                reason = outcome.reason.as_deref().unwrap_or_default(),
                "stage degraded"
            );
        }
        self.progress.stage_finished(&outcome);
        self.outcomes.push(outcome);
    }

    fn degraded(&self) -> Vec<Stage> {
        self.outcomes
            .iter()
            .filter(|o| o.status == StageStatus::Degraded)
            .map(|o| o.stage)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the keyword pipeline against an AI Capability and an optional
/// metrics source.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    ai: Arc<dyn AiCapability>,
    metrics: Option<Arc<dyn KeywordMetricsSource>>,
}

impl PipelineOrchestrator {
    pub fn new(ai: Arc<dyn AiCapability>) -> Self {
        Self { ai, metrics: None }
    }

    pub fn with_metrics(mut self, source: Arc<dyn KeywordMetricsSource>) -> Self {
        self.metrics = Some(source);
        self
    }

    /// Run every stage for one company.
    ///
    /// Only a failed generation step, an empty candidate set, or a
    /// cancellation ends the run with an error. Every other AI failure
    /// degrades its stage and the run continues.
    #[instrument(skip_all, fields(company = %ctx.name, target = config.target_count))]
    pub async fn run(
        &self,
        ctx: &CompanyContext,
        config: &PipelineConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineResult> {
        config.validate()?;
        let start = Instant::now();
        let session = AiSession::new(self.ai.clone(), config.retry);
        let mut log = StageLog::new(progress);
        let mut stats = PipelineStatistics::default();

        info!(company = %ctx.name, "starting keyword pipeline");

        // --- Research ---
        log.start(Stage::Research)?;
        let research = if config.enable_research {
            let outcome = research::collect_research(&session, ctx, config.target_count).await;
            log.finish(match outcome.failure_reason() {
                Some(reason) => StageOutcome::degraded(Stage::Research, reason),
                None => StageOutcome::success(Stage::Research),
            });
            outcome
        } else {
            log.finish(StageOutcome::skipped(Stage::Research, "disabled"));
            ResearchOutcome::default()
        };
        stats.research_count = research.keywords.len();

        // --- Generation ---
        log.start(Stage::Generation)?;
        let target = generation::generation_target(config.target_count, stats.research_count);
        let generated = match generation::generate_keywords(&session, ctx, target).await {
            Ok(keywords) => keywords,
            Err(err) => {
                log.finish(StageOutcome::failed(Stage::Generation, err.to_string()));
                return Err(OpenKeywordsError::stage(Stage::Generation, err.to_string()));
            }
        };
        stats.generated_count = generated.len();

        let mut candidates: Vec<CandidateKeyword> = research.keywords;
        candidates.extend(generated);
        if candidates.is_empty() {
            let reason = "no usable candidates";
            log.finish(StageOutcome::failed(Stage::Generation, reason));
            return Err(OpenKeywordsError::stage(Stage::Generation, reason));
        }
        log.finish(if stats.generated_count == 0 {
            StageOutcome::degraded(
                Stage::Generation,
                "generation returned no usable keywords, continuing with research only",
            )
        } else {
            StageOutcome::success(Stage::Generation)
        });

        // --- Deduplication ---
        log.start(Stage::Deduplication)?;
        let deduped = dedup::deduplicate(candidates);
        stats.duplicates_removed = deduped.duplicates_removed();
        stats.empty_removed = deduped.empty_removed;
        log.finish(StageOutcome::success(Stage::Deduplication));

        // --- Scoring ---
        log.start(Stage::Scoring)?;
        let scorer = RelevanceScorer::new(
            &session,
            config.scoring_batch_size,
            config.max_concurrent_calls,
        );
        let scoring = scorer.score(ctx, deduped.keywords).await;
        log.finish(if scoring.is_degraded() {
            StageOutcome::degraded(
                Stage::Scoring,
                format!(
                    "{} of {} batches degraded, {} keywords defaulted to 0",
                    scoring.degraded_batches.len(),
                    scoring.batches,
                    scoring.missing
                ),
            )
        } else {
            StageOutcome::success(Stage::Scoring)
        });
        let mut scored = scoring.keywords;

        // --- Enrichment ---
        log.start(Stage::Enrichment)?;
        match (&self.metrics, config.enable_enrichment) {
            (_, false) => log.finish(StageOutcome::skipped(Stage::Enrichment, "disabled")),
            (None, true) => log.finish(StageOutcome::skipped(
                Stage::Enrichment,
                "no metrics source configured",
            )),
            (Some(source), true) => {
                let outcome = enrichment::annotate_metrics(
                    source.as_ref(),
                    ctx,
                    &mut scored,
                    config.min_score,
                )
                .await;
                log.finish(if outcome.is_degraded() {
                    StageOutcome::degraded(
                        Stage::Enrichment,
                        format!("all {} lookups failed", outcome.looked_up),
                    )
                } else {
                    StageOutcome::success(Stage::Enrichment)
                });
            }
        }

        // --- Filtering ---
        log.start(Stage::Filtering)?;
        let filtered = filter::filter_keywords(
            scored,
            config.min_score,
            config.min_word_count,
            config.target_count,
        );
        stats.low_score_removed = filtered.low_score_removed;
        stats.short_removed = filtered.short_removed;
        stats.truncated = filtered.truncated;
        log.finish(StageOutcome::success(Stage::Filtering));

        // --- Clustering ---
        log.start(Stage::Clustering)?;
        let clustered = if !config.enable_clustering || config.cluster_count == 0 {
            log.finish(StageOutcome::skipped(Stage::Clustering, "disabled"));
            ClusteringOutcome::uncategorized(filtered.keywords, None)
        } else if filtered.keywords.is_empty() {
            log.finish(StageOutcome::skipped(Stage::Clustering, "no keywords to cluster"));
            ClusteringOutcome::default()
        } else {
            let outcome = SemanticClusterer::new(&session, config.cluster_count)
                .cluster(ctx, filtered.keywords)
                .await;
            log.finish(match &outcome.failure {
                Some(reason) => StageOutcome::degraded(Stage::Clustering, reason.clone()),
                None => StageOutcome::success(Stage::Clustering),
            });
            outcome
        };

        // --- Statistics ---
        fill_breakdowns(&mut stats, &clustered.keywords);
        stats.ai_calls = session.calls();
        stats.degraded_stages = log.degraded();
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            total = stats.total,
            duplicates_removed = stats.duplicates_removed,
            low_score_removed = stats.low_score_removed,
            ai_calls = stats.ai_calls,
            degraded = stats.degraded_stages.len(),
            elapsed_ms = stats.duration_ms,
            "keyword pipeline complete"
        );

        Ok(PipelineResult {
            keywords: clustered.keywords,
            clusters: clustered.clusters,
            statistics: stats,
            stages: log.outcomes,
        })
    }
}

fn fill_breakdowns(stats: &mut PipelineStatistics, keywords: &[ClusteredKeyword]) {
    stats.total = keywords.len();
    for k in keywords {
        *stats.intent_breakdown.entry(k.scored.candidate.intent).or_default() += 1;
        *stats.source_breakdown.entry(k.scored.candidate.source).or_default() += 1;
    }
    if !keywords.is_empty() {
        let sum: u64 = keywords.iter().map(|k| u64::from(k.score())).sum();
        let avg = sum as f64 / keywords.len() as f64;
        stats.avg_score = (avg * 10.0).round() / 10.0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
