//! Metrics enrichment.
//!
//! Annotates scored keywords with search volume, difficulty and SERP data
//! from a [`KeywordMetricsSource`]. Only keywords that will survive the
//! score filter are looked up. Failures leave the defaults in place.

use tracing::{debug, info, instrument, warn};

use openkeywords_shared::{
    CompanyContext, KeywordMetricsSource, MetricsError, ScoredKeyword,
};

/// Counts from one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentOutcome {
    /// Keywords sent to the source.
    pub looked_up: usize,
    /// Keywords that received metrics.
    pub annotated: usize,
    /// Keywords the source had no data for.
    pub not_found: usize,
    /// Lookups that failed for any other reason.
    pub failed: usize,
}

impl EnrichmentOutcome {
    /// Every lookup failed outright. "No data" answers do not count.
    pub fn is_degraded(&self) -> bool {
        self.looked_up > 0 && self.failed == self.looked_up
    }
}

/// Look up metrics for every keyword scoring at least `min_score`.
#[instrument(skip_all, fields(keywords = keywords.len(), min_score))]
pub async fn annotate_metrics(
    source: &dyn KeywordMetricsSource,
    ctx: &CompanyContext,
    keywords: &mut [ScoredKeyword],
    min_score: u8,
) -> EnrichmentOutcome {
    let targets: Vec<usize> = keywords
        .iter()
        .enumerate()
        .filter(|(_, k)| k.score >= min_score)
        .map(|(i, _)| i)
        .collect();

    let mut outcome = EnrichmentOutcome {
        looked_up: targets.len(),
        ..Default::default()
    };
    if targets.is_empty() {
        return outcome;
    }

    let texts: Vec<String> = targets
        .iter()
        .map(|&i| keywords[i].keyword().to_string())
        .collect();
    let results = source
        .lookup_many(&texts, &ctx.region, &ctx.language)
        .await;

    if results.len() != targets.len() {
        warn!(
            expected = targets.len(),
            got = results.len(),
            "metrics source returned a short result list"
        );
    }

    let mut results = results.into_iter();
    for &index in &targets {
        match results.next() {
            Some(Ok(metrics)) => {
                keywords[index].metrics = metrics;
                outcome.annotated += 1;
            }
            Some(Err(MetricsError::NotFound)) => outcome.not_found += 1,
            Some(Err(err)) => {
                debug!(keyword = keywords[index].keyword(), error = %err, "metrics lookup failed");
                outcome.failed += 1;
            }
            None => outcome.failed += 1,
        }
    }

    info!(
        looked_up = outcome.looked_up,
        annotated = outcome.annotated,
        not_found = outcome.not_found,
        failed = outcome.failed,
        "enrichment complete"
    );
    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
